//! Almacén de reservas
//!
//! `BookingRepository` abre unidades de trabajo (`BookingTx`). Todo lo que
//! se hace dentro de una `BookingTx` es atómico: `commit` lo publica y
//! soltar la transacción sin confirmar lo descarta. Los métodos `lock_*`
//! tienen semántica `SELECT ... FOR UPDATE`: la fila queda bloqueada para
//! otras transacciones hasta el final de ésta.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    Cart, CartItem, Location, PaymentIntent, PaymentIntentStatus, ReservationGroup, ReservationStatus,
    Vehicle, VehicleReservation,
};
use crate::utils::errors::AppResult;

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn BookingTx>>;
}

#[async_trait]
pub trait BookingTx: Send {
    async fn commit(self: Box<Self>) -> AppResult<()>;

    // --- Catálogo ---

    async fn insert_location(&mut self, location: &Location) -> AppResult<()>;
    async fn find_location(&mut self, id: Uuid) -> AppResult<Option<Location>>;
    async fn list_locations(&mut self) -> AppResult<Vec<Location>>;
    async fn location_name_exists(&mut self, name: &str) -> AppResult<bool>;
    /// La ubicación aparece en una reserva bloqueante o en algún item de carrito
    async fn location_in_use(&mut self, id: Uuid) -> AppResult<bool>;
    async fn delete_location(&mut self, id: Uuid) -> AppResult<()>;

    async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> AppResult<()>;
    async fn find_vehicle(&mut self, id: Uuid) -> AppResult<Option<Vehicle>>;
    async fn list_vehicles(&mut self) -> AppResult<Vec<Vehicle>>;
    /// Bloquea las filas de vehículos en orden ascendente de id
    async fn lock_vehicles(&mut self, ids: &[Uuid]) -> AppResult<Vec<Vehicle>>;
    async fn delete_vehicle(&mut self, id: Uuid) -> AppResult<()>;

    // --- Disponibilidad ---

    /// Vehículos con alguna línea en estado bloqueante que solapa `[start, end)`
    async fn blocked_vehicle_ids(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<HashSet<Uuid>>;

    /// ¿Hay alguna línea bloqueante del vehículo que solape `[start, end)`?
    /// `exclude_group` deja fuera las líneas de ese grupo.
    async fn has_blocking_conflict(
        &mut self,
        vehicle_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude_group: Option<Uuid>,
    ) -> AppResult<bool>;

    async fn vehicle_has_blocking_reservations(&mut self, vehicle_id: Uuid) -> AppResult<bool>;

    // --- Carrito ---

    async fn find_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>>;
    async fn lock_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>>;
    /// Inserta un carrito activo si el usuario no tiene uno; no falla si ya existe
    async fn insert_cart_if_absent(&mut self, cart: &Cart) -> AppResult<()>;
    async fn cart_items(&mut self, cart_id: Uuid) -> AppResult<Vec<CartItem>>;
    async fn insert_cart_item(&mut self, item: &CartItem) -> AppResult<()>;
    async fn delete_cart_item(&mut self, cart_id: Uuid, item_id: Uuid) -> AppResult<bool>;
    async fn clear_cart(&mut self, cart_id: Uuid) -> AppResult<()>;
    async fn mark_cart_checked_out(&mut self, cart_id: Uuid) -> AppResult<()>;

    // --- Grupos y líneas ---

    async fn insert_group(&mut self, group: &ReservationGroup) -> AppResult<()>;
    async fn find_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>>;
    async fn lock_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>>;
    /// El grupo abierto (pending / awaiting_payment) más reciente del usuario, bloqueado
    async fn lock_open_group_for_user(&mut self, user_id: Uuid) -> AppResult<Option<ReservationGroup>>;
    async fn list_groups(&mut self, user_id: Option<Uuid>) -> AppResult<Vec<ReservationGroup>>;
    /// Asigna la referencia; `false` si otra fila ya la usa
    async fn try_assign_reference(&mut self, group_id: Uuid, reference: &str) -> AppResult<bool>;
    async fn update_group_status(&mut self, group_id: Uuid, status: ReservationStatus) -> AppResult<()>;

    async fn insert_reservation(&mut self, reservation: &VehicleReservation) -> AppResult<()>;
    async fn find_reservation(&mut self, id: Uuid) -> AppResult<Option<VehicleReservation>>;
    async fn group_reservations(&mut self, group_id: Uuid) -> AppResult<Vec<VehicleReservation>>;
    async fn delete_reservation(&mut self, id: Uuid) -> AppResult<()>;

    // --- Payment intents ---

    /// Inserta el intent; `false` si el client secret ya existe
    async fn try_insert_payment_intent(&mut self, intent: &PaymentIntent) -> AppResult<bool>;
    /// Lectura sin bloqueo, para conocer el grupo antes de bloquearlo
    async fn find_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>>;
    async fn lock_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>>;
    /// Intents abiertos del grupo, bloqueados
    async fn lock_open_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>>;
    async fn group_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>>;
    async fn update_payment_intent_status(&mut self, id: Uuid, status: PaymentIntentStatus) -> AppResult<()>;
}
