//! Modelo de Vehicle
//!
//! Este módulo contiene el struct Vehicle, sus enums de categoría y motor,
//! y los límites de asientos por categoría.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Categoría del vehículo - mapea al ENUM vehicle_category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "vehicle_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    Car,
    Motorcycle,
    Caravan,
    Van,
    Truck,
}

impl VehicleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::Caravan => "caravan",
            VehicleCategory::Van => "van",
            VehicleCategory::Truck => "truck",
        }
    }

    /// Rango de asientos permitido (inclusivo)
    pub fn seat_bounds(&self) -> (i32, i32) {
        match self {
            VehicleCategory::Car => (2, 5),
            VehicleCategory::Motorcycle => (1, 2),
            VehicleCategory::Caravan => (2, 6),
            VehicleCategory::Van => (2, 9),
            VehicleCategory::Truck => (1, 3),
        }
    }
}

/// Tipo de motor - mapea al ENUM engine_type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "engine_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Petrol,
    Diesel,
    Hybrid,
    Electric,
    Lpg,
    Cng,
    Other,
}

/// Vehicle principal - mapea a la tabla vehicles más sus ubicaciones permitidas
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub category: VehicleCategory,
    pub engine_type: EngineType,
    pub seats: Option<i32>,
    pub unlimited_seats: bool,
    pub daily_price: Decimal,
    pub pickup_location_ids: Vec<Uuid>,
    pub return_location_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn allows_pickup_at(&self, location_id: Uuid) -> bool {
        self.pickup_location_ids.contains(&location_id)
    }

    pub fn allows_return_at(&self, location_id: Uuid) -> bool {
        self.return_location_ids.contains(&location_id)
    }

    /// Comprobar el filtro opcional de ubicaciones de una búsqueda
    pub fn serves(&self, pickup: Option<Uuid>, return_location: Option<Uuid>) -> bool {
        pickup.map_or(true, |id| self.allows_pickup_at(id))
            && return_location.map_or(true, |id| self.allows_return_at(id))
    }
}

impl std::fmt::Display for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.category.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> Vehicle {
        let pickup = Uuid::new_v4();
        Vehicle {
            id: Uuid::new_v4(),
            name: "Golf".to_string(),
            category: VehicleCategory::Car,
            engine_type: EngineType::Petrol,
            seats: Some(4),
            unlimited_seats: false,
            daily_price: Decimal::new(4500, 2),
            pickup_location_ids: vec![pickup],
            return_location_ids: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_serves_location_filters() {
        let v = vehicle();
        let pickup = v.pickup_location_ids[0];
        assert!(v.serves(None, None));
        assert!(v.serves(Some(pickup), None));
        assert!(!v.serves(Some(Uuid::new_v4()), None));
        assert!(!v.serves(Some(pickup), Some(Uuid::new_v4())));
    }

    #[test]
    fn test_category_serde_is_lowercase() {
        let json = serde_json::to_string(&VehicleCategory::Motorcycle).unwrap();
        assert_eq!(json, "\"motorcycle\"");
        assert_eq!(VehicleCategory::Truck.seat_bounds(), (1, 3));
    }
}
