//! Checkout: carrito -> grupo de reserva
//!
//! Todo ocurre en una única transacción. Orden de bloqueo: carrito, grupo
//! abierto del usuario y vehículos en orden ascendente de id, el mismo orden
//! grupo -> vehículos que usan las transiciones y la edición de grupos.
//! Cualquier fallo deja el carrito intacto y no crea nada.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::reservation::ranges_overlap;
use crate::models::{Actor, Location, ReservationGroup, ReservationGroupDetail, Vehicle, VehicleReservation};
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::notification_service::{NotificationEvent, NotificationPayload};
use crate::services::payment_service::cancel_open_intents;
use crate::services::permission_service::{require, BookingAction, PermissionTarget};
use crate::services::pricing_service::quote;
use crate::utils::errors::{validation_error, AppError, AppResult};

/// Referencia corta en hexadecimal mayúscula
pub(crate) fn generate_reference() -> String {
    format!("{:08X}", rand::random::<u32>())
}

/// Asignar referencia si falta, reintentando ante colisiones.
/// Si todos los intentos chocan el grupo queda sin referencia.
pub(crate) async fn ensure_reference(
    tx: &mut dyn BookingTx,
    group: &mut ReservationGroup,
    attempts: u32,
) -> AppResult<()> {
    if group.reference.is_some() {
        return Ok(());
    }
    for _ in 0..attempts {
        let candidate = generate_reference();
        if tx.try_assign_reference(group.id, &candidate).await? {
            group.reference = Some(candidate);
            return Ok(());
        }
    }
    warn!("Could not assign a unique reference to group {} after {} attempts", group.id, attempts);
    Ok(())
}

/// Construir una línea con precio calculado y nombres copiados
pub(crate) fn build_line(
    group: &ReservationGroup,
    vehicle: &Vehicle,
    pickup: &Location,
    return_location: &Location,
    start_date: NaiveDate,
    end_date: NaiveDate,
    currency: &str,
) -> VehicleReservation {
    VehicleReservation {
        id: Uuid::new_v4(),
        user_id: group.user_id,
        group_id: group.id,
        vehicle_id: Some(vehicle.id),
        vehicle_name: vehicle.name.clone(),
        pickup_location_id: Some(pickup.id),
        pickup_location_name: pickup.name.clone(),
        return_location_id: Some(return_location.id),
        return_location_name: return_location.name.clone(),
        start_date,
        end_date,
        total_price: quote(start_date, end_date, vehicle.daily_price, currency).total,
    }
}

pub struct CheckoutService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> CheckoutService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    async fn location(tx: &mut dyn BookingTx, id: Uuid) -> AppResult<Location> {
        tx.find_location(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))
    }

    #[instrument(skip_all, fields(user_id = %actor.user_id))]
    pub async fn checkout(&self, actor: &Actor) -> AppResult<ReservationGroupDetail> {
        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::Checkout,
            PermissionTarget::OwnedBy(actor.user_id),
        )?;

        let mut tx = self.ctx.repo.begin().await?;
        let today = self.ctx.clock.today();
        let currency = self.ctx.config.currency.clone();

        // 1. Carrito
        let cart = tx.lock_active_cart(actor.user_id).await?.ok_or(AppError::EmptyCart)?;
        let items = tx.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(AppError::EmptyCart);
        }

        // 2. Grupo abierto existente, antes que los vehículos
        let open_group = tx.lock_open_group_for_user(actor.user_id).await?;

        // 3. Vehículos, en orden ascendente de id
        let mut vehicle_ids: Vec<Uuid> = items.iter().map(|i| i.vehicle_id).collect();
        vehicle_ids.sort();
        vehicle_ids.dedup();
        let vehicles: HashMap<Uuid, Vehicle> = tx
            .lock_vehicles(&vehicle_ids)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        // 4. Revalidación bajo bloqueo
        for item in &items {
            let vehicle = vehicles
                .get(&item.vehicle_id)
                .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", item.vehicle_id)))?;
            if item.start_date < today {
                return Err(validation_error(
                    "start_date",
                    format!("Pickup date for {} is in the past; please update your cart.", vehicle.name),
                ));
            }
            let unavailable = !vehicle.allows_pickup_at(item.pickup_location_id)
                || !vehicle.allows_return_at(item.return_location_id)
                || tx
                    .has_blocking_conflict(vehicle.id, item.start_date, item.end_date, None)
                    .await?;
            if unavailable {
                return Err(AppError::VehicleUnavailable {
                    vehicle_id: vehicle.id,
                    vehicle_name: vehicle.name.clone(),
                    start_date: item.start_date,
                    end_date: item.end_date,
                });
            }
        }

        // 5. Reusar el grupo abierto o crear uno nuevo
        let (mut group, created) = match open_group {
            Some(group) => (group, false),
            None => {
                let group = ReservationGroup::new_pending(actor.user_id, self.ctx.clock.now());
                tx.insert_group(&group).await?;
                (group, true)
            }
        };

        if !created {
            // Las líneas propias pendientes no bloquean, pero tampoco pueden duplicarse
            let existing = tx.group_reservations(group.id).await?;
            for item in &items {
                let clash = existing.iter().any(|r| {
                    r.vehicle_id == Some(item.vehicle_id)
                        && ranges_overlap(r.start_date, r.end_date, item.start_date, item.end_date)
                });
                if clash {
                    let name = vehicles
                        .get(&item.vehicle_id)
                        .map(|v| v.name.clone())
                        .unwrap_or_default();
                    return Err(AppError::VehicleUnavailable {
                        vehicle_id: item.vehicle_id,
                        vehicle_name: name,
                        start_date: item.start_date,
                        end_date: item.end_date,
                    });
                }
            }
            // El importe de los intents abiertos ya no es válido
            cancel_open_intents(tx.as_mut(), group.id, self.ctx.clock.now()).await?;
        }

        // 6. Referencia
        ensure_reference(tx.as_mut(), &mut group, self.ctx.config.reference_attempts).await?;

        // 7. Líneas con precio
        let mut new_lines = Vec::with_capacity(items.len());
        for item in &items {
            let vehicle = vehicles
                .get(&item.vehicle_id)
                .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", item.vehicle_id)))?;
            let pickup = Self::location(tx.as_mut(), item.pickup_location_id).await?;
            let return_location = Self::location(tx.as_mut(), item.return_location_id).await?;
            let line = build_line(
                &group,
                vehicle,
                &pickup,
                &return_location,
                item.start_date,
                item.end_date,
                &currency,
            );
            tx.insert_reservation(&line).await?;
            new_lines.push(line.id);
        }

        // 8. Cerrar el carrito
        tx.clear_cart(cart.id).await?;
        tx.mark_cart_checked_out(cart.id).await?;

        let reservations = tx.group_reservations(group.id).await?;
        tx.commit().await?;

        info!(
            "✅ Checkout of {} item(s) into reservation {} ({})",
            new_lines.len(),
            group.label(),
            if created { "new" } else { "reused" }
        );

        let notifier = self.ctx.notifier.as_ref();
        if created {
            notifier
                .notify(
                    NotificationEvent::ReservationCreated,
                    NotificationPayload::for_group(&group).actor(Some(actor.user_id)),
                )
                .await;
        } else {
            for line_id in new_lines {
                notifier
                    .notify(
                        NotificationEvent::VehicleAdded,
                        NotificationPayload::for_group(&group)
                            .reservation(line_id)
                            .actor(Some(actor.user_id)),
                    )
                    .await;
            }
        }

        Ok(ReservationGroupDetail::new(group, reservations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BookingConfig;
    use crate::dto::{CreateLocationRequest, CreateVehicleRequest, RentalSelectionRequest};
    use crate::models::{
        Cart, CartItem, EngineType, PaymentIntent, PaymentIntentStatus, ReservationStatus, VehicleCategory,
    };
    use crate::repositories::{BookingRepository, InMemoryBookingRepository};
    use crate::services::{CartService, CatalogService, StatusMachine};
    use crate::utils::FixedClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Arc;

    type LockLog = Arc<Mutex<Vec<&'static str>>>;

    /// Almacén en memoria que anota cada `lock_*` y, opcionalmente, rechaza toda referencia
    #[derive(Clone, Default)]
    struct RecordingRepository {
        inner: InMemoryBookingRepository,
        locks: LockLog,
        refuse_references: bool,
    }

    #[async_trait]
    impl BookingRepository for RecordingRepository {
        async fn begin(&self) -> AppResult<Box<dyn BookingTx>> {
            Ok(Box::new(RecordingTx {
                inner: self.inner.begin().await?,
                locks: self.locks.clone(),
                refuse_references: self.refuse_references,
            }))
        }
    }

    struct RecordingTx {
        inner: Box<dyn BookingTx>,
        locks: LockLog,
        refuse_references: bool,
    }

    impl RecordingTx {
        fn record(&self, what: &'static str) {
            self.locks.lock().push(what);
        }
    }

    #[async_trait]
    impl BookingTx for RecordingTx {
        async fn commit(self: Box<Self>) -> AppResult<()> {
            self.inner.commit().await
        }
        async fn insert_location(&mut self, location: &Location) -> AppResult<()> {
            self.inner.insert_location(location).await
        }
        async fn find_location(&mut self, id: Uuid) -> AppResult<Option<Location>> {
            self.inner.find_location(id).await
        }
        async fn list_locations(&mut self) -> AppResult<Vec<Location>> {
            self.inner.list_locations().await
        }
        async fn location_name_exists(&mut self, name: &str) -> AppResult<bool> {
            self.inner.location_name_exists(name).await
        }
        async fn location_in_use(&mut self, id: Uuid) -> AppResult<bool> {
            self.inner.location_in_use(id).await
        }
        async fn delete_location(&mut self, id: Uuid) -> AppResult<()> {
            self.inner.delete_location(id).await
        }
        async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> AppResult<()> {
            self.inner.insert_vehicle(vehicle).await
        }
        async fn find_vehicle(&mut self, id: Uuid) -> AppResult<Option<Vehicle>> {
            self.inner.find_vehicle(id).await
        }
        async fn list_vehicles(&mut self) -> AppResult<Vec<Vehicle>> {
            self.inner.list_vehicles().await
        }
        async fn lock_vehicles(&mut self, ids: &[Uuid]) -> AppResult<Vec<Vehicle>> {
            self.record("vehicles");
            self.inner.lock_vehicles(ids).await
        }
        async fn delete_vehicle(&mut self, id: Uuid) -> AppResult<()> {
            self.inner.delete_vehicle(id).await
        }
        async fn blocked_vehicle_ids(&mut self, start: NaiveDate, end: NaiveDate) -> AppResult<HashSet<Uuid>> {
            self.inner.blocked_vehicle_ids(start, end).await
        }
        async fn has_blocking_conflict(
            &mut self,
            vehicle_id: Uuid,
            start: NaiveDate,
            end: NaiveDate,
            exclude_group: Option<Uuid>,
        ) -> AppResult<bool> {
            self.inner.has_blocking_conflict(vehicle_id, start, end, exclude_group).await
        }
        async fn vehicle_has_blocking_reservations(&mut self, vehicle_id: Uuid) -> AppResult<bool> {
            self.inner.vehicle_has_blocking_reservations(vehicle_id).await
        }
        async fn find_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
            self.inner.find_active_cart(user_id).await
        }
        async fn lock_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
            self.record("cart");
            self.inner.lock_active_cart(user_id).await
        }
        async fn insert_cart_if_absent(&mut self, cart: &Cart) -> AppResult<()> {
            self.inner.insert_cart_if_absent(cart).await
        }
        async fn cart_items(&mut self, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
            self.inner.cart_items(cart_id).await
        }
        async fn insert_cart_item(&mut self, item: &CartItem) -> AppResult<()> {
            self.inner.insert_cart_item(item).await
        }
        async fn delete_cart_item(&mut self, cart_id: Uuid, item_id: Uuid) -> AppResult<bool> {
            self.inner.delete_cart_item(cart_id, item_id).await
        }
        async fn clear_cart(&mut self, cart_id: Uuid) -> AppResult<()> {
            self.inner.clear_cart(cart_id).await
        }
        async fn mark_cart_checked_out(&mut self, cart_id: Uuid) -> AppResult<()> {
            self.inner.mark_cart_checked_out(cart_id).await
        }
        async fn insert_group(&mut self, group: &ReservationGroup) -> AppResult<()> {
            self.inner.insert_group(group).await
        }
        async fn find_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
            self.inner.find_group(id).await
        }
        async fn lock_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
            self.record("group");
            self.inner.lock_group(id).await
        }
        async fn lock_open_group_for_user(&mut self, user_id: Uuid) -> AppResult<Option<ReservationGroup>> {
            self.record("group");
            self.inner.lock_open_group_for_user(user_id).await
        }
        async fn list_groups(&mut self, user_id: Option<Uuid>) -> AppResult<Vec<ReservationGroup>> {
            self.inner.list_groups(user_id).await
        }
        async fn try_assign_reference(&mut self, group_id: Uuid, reference: &str) -> AppResult<bool> {
            if self.refuse_references {
                return Ok(false);
            }
            self.inner.try_assign_reference(group_id, reference).await
        }
        async fn update_group_status(&mut self, group_id: Uuid, status: ReservationStatus) -> AppResult<()> {
            self.inner.update_group_status(group_id, status).await
        }
        async fn insert_reservation(&mut self, reservation: &VehicleReservation) -> AppResult<()> {
            self.inner.insert_reservation(reservation).await
        }
        async fn find_reservation(&mut self, id: Uuid) -> AppResult<Option<VehicleReservation>> {
            self.inner.find_reservation(id).await
        }
        async fn group_reservations(&mut self, group_id: Uuid) -> AppResult<Vec<VehicleReservation>> {
            self.inner.group_reservations(group_id).await
        }
        async fn delete_reservation(&mut self, id: Uuid) -> AppResult<()> {
            self.inner.delete_reservation(id).await
        }
        async fn try_insert_payment_intent(&mut self, intent: &PaymentIntent) -> AppResult<bool> {
            self.inner.try_insert_payment_intent(intent).await
        }
        async fn find_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
            self.inner.find_payment_intent(client_secret).await
        }
        async fn lock_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
            self.record("intent");
            self.inner.lock_payment_intent(client_secret).await
        }
        async fn lock_open_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
            self.record("intent");
            self.inner.lock_open_payment_intents(group_id).await
        }
        async fn group_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
            self.inner.group_payment_intents(group_id).await
        }
        async fn update_payment_intent_status(&mut self, id: Uuid, status: PaymentIntentStatus) -> AppResult<()> {
            self.inner.update_payment_intent_status(id, status).await
        }
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, day).unwrap()
    }

    /// Contexto sobre `repo` con un vehículo en la ubicación "Depot" y un item en el carrito del cliente
    async fn context_with_cart(repo: RecordingRepository) -> (BookingContext, Actor, Actor, Vehicle) {
        let ctx = BookingContext::new(Arc::new(repo), BookingConfig::default())
            .with_clock(Arc::new(FixedClock::at_date(day(1))));
        let staff = Actor::staff(Uuid::new_v4());
        let customer = Actor::customer(Uuid::new_v4());

        let catalog = CatalogService::new(&ctx);
        let depot = catalog
            .create_location(&staff, &CreateLocationRequest { name: "Depot".to_string() })
            .await
            .unwrap();
        let vehicle = catalog
            .create_vehicle(
                &staff,
                &CreateVehicleRequest {
                    name: "Sprinter".to_string(),
                    category: VehicleCategory::Van,
                    engine_type: EngineType::Diesel,
                    seats: Some(3),
                    unlimited_seats: false,
                    daily_price: Decimal::from(50),
                    pickup_location_ids: vec![depot.id],
                    return_location_ids: vec![depot.id],
                },
            )
            .await
            .unwrap();
        CartService::new(&ctx)
            .add_item(
                &customer,
                &RentalSelectionRequest {
                    vehicle_id: vehicle.id,
                    start_date: day(10),
                    end_date: day(12),
                    pickup_location_id: Some(depot.id),
                    return_location_id: Some(depot.id),
                },
            )
            .await
            .unwrap();
        (ctx, staff, customer, vehicle)
    }

    #[test]
    fn test_reference_format() {
        let reference = generate_reference();
        assert_eq!(reference.len(), 8);
        assert!(reference.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(reference.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_checkout_survives_reference_exhaustion() {
        let repo = RecordingRepository {
            refuse_references: true,
            ..Default::default()
        };
        let (ctx, _, customer, vehicle) = context_with_cart(repo).await;

        let detail = CheckoutService::new(&ctx).checkout(&customer).await.unwrap();
        assert_eq!(detail.group.reference, None);
        assert_eq!(detail.group.label(), detail.group.id.to_string());
        assert_eq!(detail.group.status, ReservationStatus::Pending);
        assert_eq!(detail.reservations.len(), 1);
        assert_eq!(detail.reservations[0].vehicle_id, Some(vehicle.id));
    }

    #[tokio::test]
    async fn test_checkout_and_approve_lock_group_before_vehicles() {
        let repo = RecordingRepository::default();
        let locks = repo.locks.clone();
        let (ctx, staff, customer, _) = context_with_cart(repo).await;

        locks.lock().clear();
        let group_id = CheckoutService::new(&ctx).checkout(&customer).await.unwrap().group.id;
        assert_eq!(*locks.lock(), vec!["cart", "group", "vehicles"]);

        locks.lock().clear();
        StatusMachine::new(&ctx).transition(group_id, "approve", &staff).await.unwrap();
        assert_eq!(*locks.lock(), vec!["group", "vehicles"]);
    }
}
