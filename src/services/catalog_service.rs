//! Catálogo de vehículos y ubicaciones
//!
//! Altas y bajas reservadas al staff. Un vehículo o una ubicación no se
//! pueden borrar mientras una reserva bloqueante los use.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::{CreateLocationRequest, CreateVehicleRequest};
use crate::models::{Actor, Location, Vehicle};
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::permission_service::{require, BookingAction, PermissionTarget};
use crate::services::pricing_service::{quote, Quote};
use crate::utils::errors::{field_error, not_found_error, AppError, AppResult};
use crate::utils::validation::{check_daily_price, check_not_empty, check_seats, into_result};

/// Ids únicos y conservando solo los que existen; los desconocidos se reportan en `field`
async fn check_locations(
    tx: &mut dyn BookingTx,
    errors: &mut ValidationErrors,
    field: &'static str,
    ids: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    let unique: BTreeSet<Uuid> = ids.iter().copied().collect();
    for id in &unique {
        if tx.find_location(*id).await?.is_none() {
            errors.add(field, field_error("not_found", format!("Location {} does not exist.", id)));
        }
    }
    Ok(unique.into_iter().collect())
}

pub struct CatalogService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> CatalogService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    fn require_staff(&self, actor: &Actor) -> AppResult<()> {
        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::ManageCatalog,
            PermissionTarget::Catalog,
        )
    }

    // --- Ubicaciones ---

    pub async fn create_location(&self, actor: &Actor, request: &CreateLocationRequest) -> AppResult<Location> {
        self.require_staff(actor)?;
        let name = request.name.trim().to_string();

        let mut errors = request.validate().err().unwrap_or_else(ValidationErrors::new);
        check_not_empty(&mut errors, "name", &name);
        into_result(errors)?;

        let mut tx = self.ctx.repo.begin().await?;
        if tx.location_name_exists(&name).await? {
            return Err(AppError::Conflict(format!("A location named '{}' already exists.", name)));
        }
        let location = Location {
            id: Uuid::new_v4(),
            name,
            created_at: self.ctx.clock.now(),
        };
        tx.insert_location(&location).await.map_err(|e| match e {
            AppError::Integrity(_) => AppError::Conflict(format!("A location named '{}' already exists.", location.name)),
            other => other,
        })?;
        tx.commit().await?;

        info!("📍 Location created: {}", location.name);
        Ok(location)
    }

    pub async fn delete_location(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        self.require_staff(actor)?;
        let mut tx = self.ctx.repo.begin().await?;
        let location = tx
            .find_location(id)
            .await?
            .ok_or_else(|| not_found_error("Location", &id))?;

        if tx.location_in_use(id).await? {
            return Err(AppError::Conflict(format!(
                "{} is used by active reservations or carts and cannot be deleted.",
                location.name
            )));
        }
        tx.delete_location(id).await?;
        tx.commit().await?;

        info!("🗑️ Location deleted: {}", location.name);
        Ok(())
    }

    pub async fn list_locations(&self) -> AppResult<Vec<Location>> {
        let mut tx = self.ctx.repo.begin().await?;
        tx.list_locations().await
    }

    // --- Vehículos ---

    pub async fn create_vehicle(&self, actor: &Actor, request: &CreateVehicleRequest) -> AppResult<Vehicle> {
        self.require_staff(actor)?;
        let name = request.name.trim().to_string();

        let mut errors = request.validate().err().unwrap_or_else(ValidationErrors::new);
        check_not_empty(&mut errors, "name", &name);
        check_seats(&mut errors, request.category, request.seats, request.unlimited_seats);
        check_daily_price(&mut errors, request.daily_price);

        let mut tx = self.ctx.repo.begin().await?;
        let pickup_location_ids =
            check_locations(tx.as_mut(), &mut errors, "pickup_location_ids", &request.pickup_location_ids).await?;
        let return_location_ids =
            check_locations(tx.as_mut(), &mut errors, "return_location_ids", &request.return_location_ids).await?;
        into_result(errors)?;

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            name,
            category: request.category,
            engine_type: request.engine_type,
            seats: request.seats,
            unlimited_seats: request.unlimited_seats,
            daily_price: request.daily_price,
            pickup_location_ids,
            return_location_ids,
            created_at: self.ctx.clock.now(),
        };
        tx.insert_vehicle(&vehicle).await?;
        tx.commit().await?;

        info!("🚐 Vehicle created: {}", vehicle);
        Ok(vehicle)
    }

    pub async fn delete_vehicle(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        self.require_staff(actor)?;
        let mut tx = self.ctx.repo.begin().await?;
        let vehicle = tx
            .lock_vehicles(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found_error("Vehicle", &id))?;

        if tx.vehicle_has_blocking_reservations(id).await? {
            return Err(AppError::Conflict(format!(
                "{} has active reservations and cannot be deleted.",
                vehicle.name
            )));
        }
        tx.delete_vehicle(id).await?;
        tx.commit().await?;

        info!("🗑️ Vehicle deleted: {}", vehicle);
        Ok(())
    }

    pub async fn list_vehicles(&self) -> AppResult<Vec<Vehicle>> {
        let mut tx = self.ctx.repo.begin().await?;
        tx.list_vehicles().await
    }

    pub async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        let mut tx = self.ctx.repo.begin().await?;
        tx.find_vehicle(id)
            .await?
            .ok_or_else(|| not_found_error("Vehicle", &id))
    }

    /// Presupuesto de un vehículo para un rango
    pub async fn quote_vehicle(&self, id: Uuid, start: NaiveDate, end: NaiveDate) -> AppResult<Quote> {
        let vehicle = self.get_vehicle(id).await?;
        Ok(quote(start, end, vehicle.daily_price, &self.ctx.config.currency))
    }
}
