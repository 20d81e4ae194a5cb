//! Implementación en memoria del almacén de reservas
//!
//! Un único `Mutex` asíncrono protege todo el estado. `begin` toma el lock y
//! trabaja sobre una copia; `commit` la vuelca y soltar la transacción la
//! descarta. Las transacciones quedan serializadas, lo que equivale a tener
//! bloqueadas todas las filas a la vez. Se usa en tests y en modo demo.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    Cart, CartItem, Location, PaymentIntent, PaymentIntentStatus, ReservationGroup, ReservationStatus,
    Vehicle, VehicleReservation,
};
use crate::repositories::booking_repository::{BookingRepository, BookingTx};
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    locations: BTreeMap<Uuid, Location>,
    vehicles: BTreeMap<Uuid, Vehicle>,
    carts: BTreeMap<Uuid, Cart>,
    cart_items: BTreeMap<Uuid, CartItem>,
    groups: BTreeMap<Uuid, ReservationGroup>,
    reservations: BTreeMap<Uuid, VehicleReservation>,
    payment_intents: BTreeMap<Uuid, PaymentIntent>,
}

impl MemoryState {
    fn group_status(&self, group_id: Uuid) -> Option<ReservationStatus> {
        self.groups.get(&group_id).map(|g| g.status)
    }

    fn blocking_reservations(&self) -> impl Iterator<Item = &VehicleReservation> {
        self.reservations
            .values()
            .filter(|r| self.group_status(r.group_id).map_or(false, |s| s.is_blocking()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn begin(&self) -> AppResult<Box<dyn BookingTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl BookingTx for InMemoryTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn insert_location(&mut self, location: &Location) -> AppResult<()> {
        if self.location_name_exists(&location.name).await? {
            return Err(AppError::Integrity(format!("location name '{}' already exists", location.name)));
        }
        self.working.locations.insert(location.id, location.clone());
        Ok(())
    }

    async fn find_location(&mut self, id: Uuid) -> AppResult<Option<Location>> {
        Ok(self.working.locations.get(&id).cloned())
    }

    async fn list_locations(&mut self) -> AppResult<Vec<Location>> {
        let mut locations: Vec<Location> = self.working.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn location_name_exists(&mut self, name: &str) -> AppResult<bool> {
        Ok(self.working.locations.values().any(|l| l.name == name))
    }

    async fn location_in_use(&mut self, id: Uuid) -> AppResult<bool> {
        let in_reservation = self.working.blocking_reservations().any(|r| {
            r.pickup_location_id == Some(id) || r.return_location_id == Some(id)
        });
        let in_cart = self
            .working
            .cart_items
            .values()
            .any(|i| i.pickup_location_id == id || i.return_location_id == id);
        Ok(in_reservation || in_cart)
    }

    async fn delete_location(&mut self, id: Uuid) -> AppResult<()> {
        self.working.locations.remove(&id);
        for vehicle in self.working.vehicles.values_mut() {
            vehicle.pickup_location_ids.retain(|l| *l != id);
            vehicle.return_location_ids.retain(|l| *l != id);
        }
        for reservation in self.working.reservations.values_mut() {
            if reservation.pickup_location_id == Some(id) {
                reservation.pickup_location_id = None;
            }
            if reservation.return_location_id == Some(id) {
                reservation.return_location_id = None;
            }
        }
        Ok(())
    }

    async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> AppResult<()> {
        self.working.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn find_vehicle(&mut self, id: Uuid) -> AppResult<Option<Vehicle>> {
        Ok(self.working.vehicles.get(&id).cloned())
    }

    async fn list_vehicles(&mut self) -> AppResult<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> = self.working.vehicles.values().cloned().collect();
        vehicles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(vehicles)
    }

    async fn lock_vehicles(&mut self, ids: &[Uuid]) -> AppResult<Vec<Vehicle>> {
        // BTreeMap ya itera en orden ascendente de id
        Ok(self
            .working
            .vehicles
            .values()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect())
    }

    async fn delete_vehicle(&mut self, id: Uuid) -> AppResult<()> {
        self.working.vehicles.remove(&id);
        self.working.cart_items.retain(|_, item| item.vehicle_id != id);
        for reservation in self.working.reservations.values_mut() {
            if reservation.vehicle_id == Some(id) {
                reservation.vehicle_id = None;
            }
        }
        Ok(())
    }

    async fn blocked_vehicle_ids(&mut self, start: NaiveDate, end: NaiveDate) -> AppResult<HashSet<Uuid>> {
        Ok(self
            .working
            .blocking_reservations()
            .filter(|r| r.overlaps(start, end))
            .filter_map(|r| r.vehicle_id)
            .collect())
    }

    async fn has_blocking_conflict(
        &mut self,
        vehicle_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude_group: Option<Uuid>,
    ) -> AppResult<bool> {
        Ok(self.working.blocking_reservations().any(|r| {
            r.vehicle_id == Some(vehicle_id) && r.overlaps(start, end) && Some(r.group_id) != exclude_group
        }))
    }

    async fn vehicle_has_blocking_reservations(&mut self, vehicle_id: Uuid) -> AppResult<bool> {
        Ok(self
            .working
            .blocking_reservations()
            .any(|r| r.vehicle_id == Some(vehicle_id)))
    }

    async fn find_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
        Ok(self
            .working
            .carts
            .values()
            .find(|c| c.user_id == user_id && !c.checked_out)
            .cloned())
    }

    async fn lock_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
        self.find_active_cart(user_id).await
    }

    async fn insert_cart_if_absent(&mut self, cart: &Cart) -> AppResult<()> {
        if self.find_active_cart(cart.user_id).await?.is_none() {
            self.working.carts.insert(cart.id, cart.clone());
        }
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self
            .working
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.vehicle_id.cmp(&b.vehicle_id)));
        Ok(items)
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> AppResult<()> {
        self.working.cart_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: Uuid, item_id: Uuid) -> AppResult<bool> {
        let owned = self
            .working
            .cart_items
            .get(&item_id)
            .map_or(false, |i| i.cart_id == cart_id);
        if owned {
            self.working.cart_items.remove(&item_id);
        }
        Ok(owned)
    }

    async fn clear_cart(&mut self, cart_id: Uuid) -> AppResult<()> {
        self.working.cart_items.retain(|_, item| item.cart_id != cart_id);
        Ok(())
    }

    async fn mark_cart_checked_out(&mut self, cart_id: Uuid) -> AppResult<()> {
        if let Some(cart) = self.working.carts.get_mut(&cart_id) {
            cart.checked_out = true;
        }
        Ok(())
    }

    async fn insert_group(&mut self, group: &ReservationGroup) -> AppResult<()> {
        self.working.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
        Ok(self.working.groups.get(&id).cloned())
    }

    async fn lock_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
        self.find_group(id).await
    }

    async fn lock_open_group_for_user(&mut self, user_id: Uuid) -> AppResult<Option<ReservationGroup>> {
        Ok(self
            .working
            .groups
            .values()
            .filter(|g| g.user_id == user_id && g.status.is_open())
            .max_by_key(|g| g.created_at)
            .cloned())
    }

    async fn list_groups(&mut self, user_id: Option<Uuid>) -> AppResult<Vec<ReservationGroup>> {
        let mut groups: Vec<ReservationGroup> = self
            .working
            .groups
            .values()
            .filter(|g| user_id.map_or(true, |u| g.user_id == u))
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn try_assign_reference(&mut self, group_id: Uuid, reference: &str) -> AppResult<bool> {
        let taken = self
            .working
            .groups
            .values()
            .any(|g| g.id != group_id && g.reference.as_deref() == Some(reference));
        if taken {
            return Ok(false);
        }
        if let Some(group) = self.working.groups.get_mut(&group_id) {
            group.reference = Some(reference.to_string());
        }
        Ok(true)
    }

    async fn update_group_status(&mut self, group_id: Uuid, status: ReservationStatus) -> AppResult<()> {
        if let Some(group) = self.working.groups.get_mut(&group_id) {
            group.status = status;
        }
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &VehicleReservation) -> AppResult<()> {
        self.working.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_reservation(&mut self, id: Uuid) -> AppResult<Option<VehicleReservation>> {
        Ok(self.working.reservations.get(&id).cloned())
    }

    async fn group_reservations(&mut self, group_id: Uuid) -> AppResult<Vec<VehicleReservation>> {
        let mut reservations: Vec<VehicleReservation> = self
            .working
            .reservations
            .values()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(reservations)
    }

    async fn delete_reservation(&mut self, id: Uuid) -> AppResult<()> {
        self.working.reservations.remove(&id);
        Ok(())
    }

    async fn try_insert_payment_intent(&mut self, intent: &PaymentIntent) -> AppResult<bool> {
        let duplicate = self
            .working
            .payment_intents
            .values()
            .any(|p| p.client_secret == intent.client_secret);
        if duplicate {
            return Ok(false);
        }
        self.working.payment_intents.insert(intent.id, intent.clone());
        Ok(true)
    }

    async fn find_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
        Ok(self
            .working
            .payment_intents
            .values()
            .find(|p| p.client_secret == client_secret)
            .cloned())
    }

    async fn lock_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
        self.find_payment_intent(client_secret).await
    }

    async fn lock_open_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
        Ok(self
            .working
            .payment_intents
            .values()
            .filter(|p| p.group_id == group_id && p.status.is_open())
            .cloned()
            .collect())
    }

    async fn group_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
        let mut intents: Vec<PaymentIntent> = self
            .working
            .payment_intents
            .values()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect();
        intents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(intents)
    }

    async fn update_payment_intent_status(&mut self, id: Uuid, status: PaymentIntentStatus) -> AppResult<()> {
        if let Some(intent) = self.working.payment_intents.get_mut(&id) {
            intent.status = status;
        }
        Ok(())
    }
}
