use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::{EngineType, VehicleCategory};

// Request para crear un vehículo
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVehicleRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters."))]
    pub name: String,
    pub category: VehicleCategory,
    pub engine_type: EngineType,
    pub seats: Option<i32>,
    #[serde(default)]
    pub unlimited_seats: bool,
    pub daily_price: Decimal,
    #[serde(default)]
    pub pickup_location_ids: Vec<Uuid>,
    #[serde(default)]
    pub return_location_ids: Vec<Uuid>,
}

// Request para crear una ubicación
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLocationRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters."))]
    pub name: String,
}

// Query de búsqueda de vehículos disponibles
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_location_id: Option<Uuid>,
    pub return_location_id: Option<Uuid>,
}

// Query de presupuesto para un vehículo
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
