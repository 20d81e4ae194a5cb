//! Carrito de alquiler
//!
//! Al añadir un item se validan fechas, ubicaciones y disponibilidad, y se
//! devuelven todos los campos inválidos de una vez. Un rango que solapa otro
//! item del mismo vehículo se rechaza; uno contiguo con el mismo vehículo y
//! las mismas ubicaciones se fusiona en un único item.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::dto::RentalSelectionRequest;
use crate::models::reservation::{ranges_adjoin, ranges_overlap};
use crate::models::{Actor, Cart, CartItem, Location, Vehicle};
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::pricing_service::{quote, Quote};
use crate::utils::errors::{field_error, not_found_error, AppError, AppResult};
use crate::utils::validation::{check_rental_dates, check_rental_length, into_result};

/// Selección ya validada, con las filas cargadas
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    pub vehicle: Vehicle,
    pub pickup: Location,
    pub return_location: Location,
}

/// Validar fechas, vehículo y ubicaciones de una selección, acumulando errores
pub(crate) async fn validate_selection(
    tx: &mut dyn BookingTx,
    request: &RentalSelectionRequest,
    today: chrono::NaiveDate,
    max_rental_days: i64,
) -> AppResult<Selection> {
    let mut errors = ValidationErrors::new();
    check_rental_dates(&mut errors, request.start_date, request.end_date, today, max_rental_days);

    let vehicle = tx.find_vehicle(request.vehicle_id).await?;
    if vehicle.is_none() {
        errors.add("vehicle_id", field_error("not_found", "Vehicle not found."));
    }

    let pickup = match request.pickup_location_id {
        Some(id) => {
            let location = tx.find_location(id).await?;
            if location.is_none() {
                errors.add("pickup_location_id", field_error("not_found", "Pickup location not found."));
            }
            location
        }
        None => {
            errors.add("pickup_location_id", field_error("required", "Please choose a pickup location."));
            None
        }
    };

    let return_location = match request.return_location_id {
        Some(id) => {
            let location = tx.find_location(id).await?;
            if location.is_none() {
                errors.add("return_location_id", field_error("not_found", "Return location not found."));
            }
            location
        }
        None => {
            errors.add("return_location_id", field_error("required", "Please choose a return location."));
            None
        }
    };

    if let Some(vehicle) = &vehicle {
        if let Some(pickup) = &pickup {
            if !vehicle.allows_pickup_at(pickup.id) {
                errors.add(
                    "pickup_location_id",
                    field_error(
                        "location_not_allowed",
                        format!("{} cannot be picked up at {}.", vehicle.name, pickup.name),
                    ),
                );
            }
        }
        if let Some(return_location) = &return_location {
            if !vehicle.allows_return_at(return_location.id) {
                errors.add(
                    "return_location_id",
                    field_error(
                        "location_not_allowed",
                        format!("{} cannot be returned at {}.", vehicle.name, return_location.name),
                    ),
                );
            }
        }
    }

    into_result(errors)?;

    match (vehicle, pickup, return_location) {
        (Some(vehicle), Some(pickup), Some(return_location)) => Ok(Selection {
            vehicle,
            pickup,
            return_location,
        }),
        _ => Err(AppError::Internal("selection incomplete after validation".to_string())),
    }
}

/// Carrito activo del usuario, creado si no existe. Deja la fila bloqueada.
pub(crate) async fn ensure_active_cart(
    tx: &mut dyn BookingTx,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Cart> {
    tx.insert_cart_if_absent(&Cart::new(user_id, now)).await?;
    tx.lock_active_cart(user_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("active cart for user {} vanished", user_id)))
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub item: CartItem,
    pub vehicle_name: String,
    pub quote: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Option<Cart>,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub currency: String,
}

pub struct CartService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> CartService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    /// Creación perezosa e idempotente del carrito activo
    pub async fn get_or_create_active(&self, actor: &Actor) -> AppResult<Cart> {
        let mut tx = self.ctx.repo.begin().await?;
        let cart = ensure_active_cart(tx.as_mut(), actor.user_id, self.ctx.clock.now()).await?;
        tx.commit().await?;
        Ok(cart)
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id, vehicle_id = %request.vehicle_id))]
    pub async fn add_item(&self, actor: &Actor, request: &RentalSelectionRequest) -> AppResult<CartItem> {
        let mut tx = self.ctx.repo.begin().await?;
        let selection = validate_selection(
            tx.as_mut(),
            request,
            self.ctx.clock.today(),
            self.ctx.config.max_rental_days,
        )
        .await?;
        let vehicle = &selection.vehicle;

        tx.lock_vehicles(&[vehicle.id]).await?;
        let cart = ensure_active_cart(tx.as_mut(), actor.user_id, self.ctx.clock.now()).await?;
        let items = tx.cart_items(cart.id).await?;

        let (start, end) = (request.start_date, request.end_date);
        let same_vehicle: Vec<&CartItem> = items.iter().filter(|i| i.vehicle_id == vehicle.id).collect();

        if same_vehicle
            .iter()
            .any(|i| ranges_overlap(i.start_date, i.end_date, start, end))
        {
            let mut errors = ValidationErrors::new();
            errors.add(
                "vehicle_id",
                field_error(
                    "duplicate",
                    format!("{} is already in your cart for overlapping dates.", vehicle.name),
                ),
            );
            return Err(AppError::Validation(errors));
        }

        let merged: Vec<&CartItem> = same_vehicle
            .into_iter()
            .filter(|i| {
                i.same_selection(vehicle.id, selection.pickup.id, selection.return_location.id)
                    && ranges_adjoin(i.start_date, i.end_date, start, end)
            })
            .collect();
        let merged_start = merged.iter().fold(start, |acc, i| acc.min(i.start_date));
        let merged_end = merged.iter().fold(end, |acc, i| acc.max(i.end_date));

        let mut errors = ValidationErrors::new();
        check_rental_length(&mut errors, merged_start, merged_end, self.ctx.config.max_rental_days);
        if tx
            .has_blocking_conflict(vehicle.id, merged_start, merged_end, None)
            .await?
        {
            errors.add(
                "vehicle_id",
                field_error(
                    "unavailable",
                    format!(
                        "{} is not available from {} to {}.",
                        vehicle.name, merged_start, merged_end
                    ),
                ),
            );
        }
        into_result(errors)?;

        for item in &merged {
            tx.delete_cart_item(cart.id, item.id).await?;
        }

        let item = CartItem {
            id: Uuid::new_v4(),
            cart_id: cart.id,
            vehicle_id: vehicle.id,
            start_date: merged_start,
            end_date: merged_end,
            pickup_location_id: selection.pickup.id,
            return_location_id: selection.return_location.id,
        };
        tx.insert_cart_item(&item).await?;
        tx.commit().await?;

        if merged.is_empty() {
            info!("🛒 {} added to cart {} ({} -> {})", vehicle.name, cart.id, merged_start, merged_end);
        } else {
            info!(
                "🛒 {} merged with {} adjoining item(s) in cart {} ({} -> {})",
                vehicle.name,
                merged.len(),
                cart.id,
                merged_start,
                merged_end
            );
        }
        Ok(item)
    }

    pub async fn remove_item(&self, actor: &Actor, item_id: Uuid) -> AppResult<()> {
        let mut tx = self.ctx.repo.begin().await?;
        let cart = tx
            .lock_active_cart(actor.user_id)
            .await?
            .ok_or_else(|| not_found_error("Cart item", &item_id))?;

        if !tx.delete_cart_item(cart.id, item_id).await? {
            return Err(not_found_error("Cart item", &item_id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Carrito con presupuesto por item y total acumulado
    pub async fn view(&self, actor: &Actor) -> AppResult<CartView> {
        let mut tx = self.ctx.repo.begin().await?;
        let currency = self.ctx.config.currency.clone();

        let cart = match tx.find_active_cart(actor.user_id).await? {
            Some(cart) => cart,
            None => {
                return Ok(CartView {
                    cart: None,
                    lines: Vec::new(),
                    total: Decimal::ZERO,
                    currency,
                })
            }
        };

        let mut lines = Vec::new();
        for item in tx.cart_items(cart.id).await? {
            let Some(vehicle) = tx.find_vehicle(item.vehicle_id).await? else {
                continue;
            };
            let quote = quote(item.start_date, item.end_date, vehicle.daily_price, &currency);
            lines.push(CartLine {
                item,
                vehicle_name: vehicle.name,
                quote,
            });
        }
        let total = lines.iter().map(|l| l.quote.total).sum();

        Ok(CartView {
            cart: Some(cart),
            lines,
            total,
            currency,
        })
    }
}
