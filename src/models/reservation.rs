//! Modelos de reservas
//!
//! `ReservationGroup` es un pedido que agrupa una o varias
//! `VehicleReservation` (líneas). El estado vive en el grupo y solo cambia
//! a través de la máquina de estados (`services::status_machine`).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del grupo - mapea al ENUM reservation_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    AwaitingPayment,
    Reserved,
    Rejected,
    Canceled,
    Completed,
}

impl ReservationStatus {
    /// Estados que ocupan el vehículo. `Pending` es provisional y no bloquea.
    pub const BLOCKING: [ReservationStatus; 2] =
        [ReservationStatus::AwaitingPayment, ReservationStatus::Reserved];

    /// Estados en los que un grupo se reutiliza en checkout y admite cambios de líneas
    pub const OPEN: [ReservationStatus; 2] =
        [ReservationStatus::Pending, ReservationStatus::AwaitingPayment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::AwaitingPayment => "awaiting_payment",
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Canceled => "canceled",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Solapamiento estricto de intervalos semiabiertos `[start, end)`
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Intervalos que se tocan sin solaparse (`a` termina donde empieza `b` o viceversa)
pub fn ranges_adjoin(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_end == b_start || b_end == a_start
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct ReservationGroup {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference: Option<String>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl ReservationGroup {
    pub fn new_pending(user_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            reference: None,
            status: ReservationStatus::Pending,
            created_at,
        }
    }

    /// Referencia para mensajes: el código si existe, si no el id
    pub fn label(&self) -> String {
        self.reference.clone().unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct VehicleReservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub vehicle_name: String,
    pub pickup_location_id: Option<Uuid>,
    pub pickup_location_name: String,
    pub return_location_id: Option<Uuid>,
    pub return_location_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: Decimal,
}

impl VehicleReservation {
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        ranges_overlap(self.start_date, self.end_date, start, end)
    }
}

/// Grupo con sus líneas, forma externa usada por la API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationGroupDetail {
    #[serde(flatten)]
    pub group: ReservationGroup,
    pub reservations: Vec<VehicleReservation>,
    pub total_price: Decimal,
}

impl ReservationGroupDetail {
    pub fn new(group: ReservationGroup, reservations: Vec<VehicleReservation>) -> Self {
        let total_price = reservations.iter().map(|r| r.total_price).sum();
        Self { group, reservations, total_price }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, day).unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        assert!(ranges_overlap(d(1), d(5), d(4), d(8)));
        assert!(ranges_overlap(d(1), d(10), d(3), d(4)));
        // Devolución y recogida el mismo día no se solapan
        assert!(!ranges_overlap(d(1), d(5), d(5), d(8)));
        assert!(!ranges_overlap(d(5), d(8), d(1), d(5)));
        assert!(ranges_adjoin(d(1), d(5), d(5), d(8)));
        assert!(!ranges_adjoin(d(1), d(5), d(6), d(8)));
    }

    #[test]
    fn test_blocking_set_excludes_pending() {
        assert!(!ReservationStatus::Pending.is_blocking());
        assert!(ReservationStatus::AwaitingPayment.is_blocking());
        assert!(ReservationStatus::Reserved.is_blocking());
        assert!(!ReservationStatus::Completed.is_blocking());
        assert!(ReservationStatus::AwaitingPayment.is_open());
        assert!(!ReservationStatus::Reserved.is_open());
    }

    #[test]
    fn test_detail_round_trip_preserves_lines() {
        let group = ReservationGroup {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            reference: Some("A1B2C3D4".to_string()),
            status: ReservationStatus::AwaitingPayment,
            created_at: Utc::now(),
        };
        let line = VehicleReservation {
            id: Uuid::new_v4(),
            user_id: group.user_id,
            group_id: group.id,
            vehicle_id: Some(Uuid::new_v4()),
            vehicle_name: "Transit".to_string(),
            pickup_location_id: Some(Uuid::new_v4()),
            pickup_location_name: "Airport".to_string(),
            return_location_id: None,
            return_location_name: "Harbor Gate".to_string(),
            start_date: d(3),
            end_date: d(10),
            total_price: Decimal::new(12345, 2),
        };
        let detail = ReservationGroupDetail::new(group, vec![line]);

        let json = serde_json::to_string(&detail).unwrap();
        let back: ReservationGroupDetail = serde_json::from_str(&json).unwrap();

        assert_eq!(back, detail);
        assert_eq!(back.group.status, ReservationStatus::AwaitingPayment);
        assert_eq!(back.reservations[0].total_price, Decimal::new(12345, 2));
    }
}
