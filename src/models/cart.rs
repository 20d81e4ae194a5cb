//! Modelos de Cart y CartItem
//!
//! Un usuario tiene como máximo un carrito activo (no checked-out). Los items
//! usan rangos de fechas semiabiertos `[start_date, end_date)`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub checked_out: bool,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            checked_out: false,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_location_id: Uuid,
    pub return_location_id: Uuid,
}

impl CartItem {
    /// Misma combinación vehículo + ubicaciones (candidato a fusionarse)
    pub fn same_selection(&self, vehicle_id: Uuid, pickup: Uuid, return_location: Uuid) -> bool {
        self.vehicle_id == vehicle_id
            && self.pickup_location_id == pickup
            && self.return_location_id == return_location
    }
}
