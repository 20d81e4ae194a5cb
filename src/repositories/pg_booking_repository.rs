//! Implementación PostgreSQL del almacén de reservas
//!
//! Cada `BookingTx` envuelve una transacción sqlx. Los `lock_*` usan
//! `SELECT ... FOR UPDATE`; las inserciones que pueden chocar con un índice
//! único (referencia, client secret) se hacen dentro de un savepoint para que
//! el fallo no aborte la transacción completa.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Connection, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Cart, CartItem, Location, PaymentIntent, PaymentIntentStatus, ReservationGroup, ReservationStatus,
    Vehicle, VehicleReservation,
};
use crate::repositories::booking_repository::{BookingRepository, BookingTx};
use crate::utils::errors::{AppError, AppResult};

const VEHICLE_COLUMNS: &str = r#"
    v.id, v.name, v.category, v.engine_type, v.seats, v.unlimited_seats, v.daily_price, v.created_at,
    ARRAY(SELECT p.location_id FROM vehicle_pickup_locations p WHERE p.vehicle_id = v.id ORDER BY p.location_id) AS pickup_location_ids,
    ARRAY(SELECT r.location_id FROM vehicle_return_locations r WHERE r.vehicle_id = v.id ORDER BY r.location_id) AS return_location_ids
"#;

const RESERVATION_COLUMNS: &str = r#"
    id, user_id, group_id, vehicle_id, vehicle_name, pickup_location_id, pickup_location_name,
    return_location_id, return_location_name, start_date, end_date, total_price
"#;

/// Lista SQL de los estados bloqueantes: `'awaiting_payment', 'reserved'`
fn blocking_statuses() -> String {
    ReservationStatus::BLOCKING
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn begin(&self) -> AppResult<Box<dyn BookingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBookingTx { tx }))
    }
}

pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    // --- Catálogo ---

    async fn insert_location(&mut self, location: &Location) -> AppResult<()> {
        sqlx::query("INSERT INTO locations (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(location.id)
            .bind(&location.name)
            .bind(location.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::from_db(e, "Error creating location"))?;
        Ok(())
    }

    async fn find_location(&mut self, id: Uuid) -> AppResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>("SELECT id, name, created_at FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(location)
    }

    async fn list_locations(&mut self) -> AppResult<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>("SELECT id, name, created_at FROM locations ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(locations)
    }

    async fn location_name_exists(&mut self, name: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM locations WHERE name = $1)")
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn location_in_use(&mut self, id: Uuid) -> AppResult<bool> {
        let query = format!(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM vehicle_reservations r
                JOIN reservation_groups g ON g.id = r.group_id
                WHERE (r.pickup_location_id = $1 OR r.return_location_id = $1)
                  AND g.status IN ({})
            ) OR EXISTS(
                SELECT 1 FROM cart_items WHERE pickup_location_id = $1 OR return_location_id = $1
            )
            "#,
            blocking_statuses()
        );
        let in_use: bool = sqlx::query_scalar(&query)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(in_use)
    }

    async fn delete_location(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_vehicle(&mut self, vehicle: &Vehicle) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, name, category, engine_type, seats, unlimited_seats, daily_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(vehicle.id)
        .bind(&vehicle.name)
        .bind(vehicle.category)
        .bind(vehicle.engine_type)
        .bind(vehicle.seats)
        .bind(vehicle.unlimited_seats)
        .bind(vehicle.daily_price)
        .bind(vehicle.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_db(e, "Error creating vehicle"))?;

        sqlx::query(
            "INSERT INTO vehicle_pickup_locations (vehicle_id, location_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(vehicle.id)
        .bind(&vehicle.pickup_location_ids)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            "INSERT INTO vehicle_return_locations (vehicle_id, location_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(vehicle.id)
        .bind(&vehicle.return_location_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_vehicle(&mut self, id: Uuid) -> AppResult<Option<Vehicle>> {
        let query = format!("SELECT {} FROM vehicles v WHERE v.id = $1", VEHICLE_COLUMNS);
        let vehicle = sqlx::query_as::<_, Vehicle>(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(vehicle)
    }

    async fn list_vehicles(&mut self) -> AppResult<Vec<Vehicle>> {
        let query = format!("SELECT {} FROM vehicles v ORDER BY v.name, v.id", VEHICLE_COLUMNS);
        let vehicles = sqlx::query_as::<_, Vehicle>(&query)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(vehicles)
    }

    async fn lock_vehicles(&mut self, ids: &[Uuid]) -> AppResult<Vec<Vehicle>> {
        let query = format!(
            "SELECT {} FROM vehicles v WHERE v.id = ANY($1) ORDER BY v.id FOR UPDATE OF v",
            VEHICLE_COLUMNS
        );
        let vehicles = sqlx::query_as::<_, Vehicle>(&query)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        debug!("Locked {} vehicle rows", vehicles.len());
        Ok(vehicles)
    }

    async fn delete_vehicle(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM vehicles WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // --- Disponibilidad ---

    async fn blocked_vehicle_ids(&mut self, start: NaiveDate, end: NaiveDate) -> AppResult<HashSet<Uuid>> {
        let query = format!(
            r#"
            SELECT DISTINCT r.vehicle_id
            FROM vehicle_reservations r
            JOIN reservation_groups g ON g.id = r.group_id
            WHERE r.vehicle_id IS NOT NULL
              AND g.status IN ({})
              AND r.start_date < $2
              AND r.end_date > $1
            "#,
            blocking_statuses()
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn has_blocking_conflict(
        &mut self,
        vehicle_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude_group: Option<Uuid>,
    ) -> AppResult<bool> {
        let query = format!(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM vehicle_reservations r
                JOIN reservation_groups g ON g.id = r.group_id
                WHERE r.vehicle_id = $1
                  AND g.status IN ({})
                  AND r.start_date < $3
                  AND r.end_date > $2
                  AND ($4::uuid IS NULL OR r.group_id <> $4)
            )
            "#,
            blocking_statuses()
        );
        let conflict: bool = sqlx::query_scalar(&query)
            .bind(vehicle_id)
            .bind(start)
            .bind(end)
            .bind(exclude_group)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(conflict)
    }

    async fn vehicle_has_blocking_reservations(&mut self, vehicle_id: Uuid) -> AppResult<bool> {
        let query = format!(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM vehicle_reservations r
                JOIN reservation_groups g ON g.id = r.group_id
                WHERE r.vehicle_id = $1 AND g.status IN ({})
            )
            "#,
            blocking_statuses()
        );
        let blocked: bool = sqlx::query_scalar(&query)
            .bind(vehicle_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(blocked)
    }

    // --- Carrito ---

    async fn find_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>(
            "SELECT id, user_id, checked_out, created_at FROM carts WHERE user_id = $1 AND NOT checked_out",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(cart)
    }

    async fn lock_active_cart(&mut self, user_id: Uuid) -> AppResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>(
            "SELECT id, user_id, checked_out, created_at FROM carts WHERE user_id = $1 AND NOT checked_out FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(cart)
    }

    async fn insert_cart_if_absent(&mut self, cart: &Cart) -> AppResult<()> {
        // El índice parcial resuelve la carrera entre dos creadores concurrentes
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, checked_out, created_at)
            VALUES ($1, $2, FALSE, $3)
            ON CONFLICT (user_id) WHERE NOT checked_out DO NOTHING
            "#,
        )
        .bind(cart.id)
        .bind(cart.user_id)
        .bind(cart.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, cart_id, vehicle_id, start_date, end_date, pickup_location_id, return_location_id
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY start_date, vehicle_id
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(items)
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, vehicle_id, start_date, end_date, pickup_location_id, return_location_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(item.cart_id)
        .bind(item.vehicle_id)
        .bind(item.start_date)
        .bind(item.end_date)
        .bind(item.pickup_location_id)
        .bind(item.return_location_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: Uuid, item_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, cart_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_cart_checked_out(&mut self, cart_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE carts SET checked_out = TRUE WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // --- Grupos y líneas ---

    async fn insert_group(&mut self, group: &ReservationGroup) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO reservation_groups (id, user_id, reference, status, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(group.id)
        .bind(group.user_id)
        .bind(&group.reference)
        .bind(group.status)
        .bind(group.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_db(e, "Error creating reservation group"))?;
        Ok(())
    }

    async fn find_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
        let group = sqlx::query_as::<_, ReservationGroup>(
            "SELECT id, user_id, reference, status, created_at FROM reservation_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(group)
    }

    async fn lock_group(&mut self, id: Uuid) -> AppResult<Option<ReservationGroup>> {
        let group = sqlx::query_as::<_, ReservationGroup>(
            "SELECT id, user_id, reference, status, created_at FROM reservation_groups WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(group)
    }

    async fn lock_open_group_for_user(&mut self, user_id: Uuid) -> AppResult<Option<ReservationGroup>> {
        let group = sqlx::query_as::<_, ReservationGroup>(
            r#"
            SELECT id, user_id, reference, status, created_at
            FROM reservation_groups
            WHERE user_id = $1 AND status IN ('pending', 'awaiting_payment')
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(group)
    }

    async fn list_groups(&mut self, user_id: Option<Uuid>) -> AppResult<Vec<ReservationGroup>> {
        let groups = sqlx::query_as::<_, ReservationGroup>(
            r#"
            SELECT id, user_id, reference, status, created_at
            FROM reservation_groups
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(groups)
    }

    async fn try_assign_reference(&mut self, group_id: Uuid, reference: &str) -> AppResult<bool> {
        let mut savepoint = self.tx.begin().await?;
        let result = sqlx::query("UPDATE reservation_groups SET reference = $2 WHERE id = $1")
            .bind(group_id)
            .bind(reference)
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(true)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!("Reference {} already taken, rolling back savepoint", reference);
                savepoint.rollback().await?;
                Ok(false)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn update_group_status(&mut self, group_id: Uuid, status: ReservationStatus) -> AppResult<()> {
        sqlx::query("UPDATE reservation_groups SET status = $2 WHERE id = $1")
            .bind(group_id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &VehicleReservation) -> AppResult<()> {
        let query = format!(
            "INSERT INTO vehicle_reservations ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            RESERVATION_COLUMNS
        );
        sqlx::query(&query)
            .bind(reservation.id)
            .bind(reservation.user_id)
            .bind(reservation.group_id)
            .bind(reservation.vehicle_id)
            .bind(&reservation.vehicle_name)
            .bind(reservation.pickup_location_id)
            .bind(&reservation.pickup_location_name)
            .bind(reservation.return_location_id)
            .bind(&reservation.return_location_name)
            .bind(reservation.start_date)
            .bind(reservation.end_date)
            .bind(reservation.total_price)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_reservation(&mut self, id: Uuid) -> AppResult<Option<VehicleReservation>> {
        let query = format!("SELECT {} FROM vehicle_reservations WHERE id = $1", RESERVATION_COLUMNS);
        let reservation = sqlx::query_as::<_, VehicleReservation>(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reservation)
    }

    async fn group_reservations(&mut self, group_id: Uuid) -> AppResult<Vec<VehicleReservation>> {
        let query = format!(
            "SELECT {} FROM vehicle_reservations WHERE group_id = $1 ORDER BY start_date, id",
            RESERVATION_COLUMNS
        );
        let reservations = sqlx::query_as::<_, VehicleReservation>(&query)
            .bind(group_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(reservations)
    }

    async fn delete_reservation(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM vehicle_reservations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // --- Payment intents ---

    async fn try_insert_payment_intent(&mut self, intent: &PaymentIntent) -> AppResult<bool> {
        let mut savepoint = self.tx.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO payment_intents (id, group_id, amount_minor, currency, client_secret, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(intent.id)
        .bind(intent.group_id)
        .bind(intent.amount_minor)
        .bind(&intent.currency)
        .bind(&intent.client_secret)
        .bind(intent.status)
        .bind(intent.created_at)
        .bind(intent.expires_at)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(true)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                savepoint.rollback().await?;
                Ok(false)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn find_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
        let intent = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, group_id, amount_minor, currency, client_secret, status, created_at, expires_at
            FROM payment_intents
            WHERE client_secret = $1
            "#,
        )
        .bind(client_secret)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(intent)
    }

    async fn lock_payment_intent(&mut self, client_secret: &str) -> AppResult<Option<PaymentIntent>> {
        let intent = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, group_id, amount_minor, currency, client_secret, status, created_at, expires_at
            FROM payment_intents
            WHERE client_secret = $1
            FOR UPDATE
            "#,
        )
        .bind(client_secret)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(intent)
    }

    async fn lock_open_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
        let intents = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, group_id, amount_minor, currency, client_secret, status, created_at, expires_at
            FROM payment_intents
            WHERE group_id = $1 AND status IN ('requires_confirmation', 'processing')
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(intents)
    }

    async fn group_payment_intents(&mut self, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
        let intents = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, group_id, amount_minor, currency, client_secret, status, created_at, expires_at
            FROM payment_intents
            WHERE group_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(intents)
    }

    async fn update_payment_intent_status(&mut self, id: Uuid, status: PaymentIntentStatus) -> AppResult<()> {
        sqlx::query("UPDATE payment_intents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_statuses_sql_list() {
        assert_eq!(blocking_statuses(), "'awaiting_payment', 'reserved'");
    }
}
