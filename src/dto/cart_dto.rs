use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Selección de vehículo + fechas + ubicaciones.
// Se usa al añadir al carrito y al añadir un vehículo a una reserva existente.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RentalSelectionRequest {
    pub vehicle_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_location_id: Option<Uuid>,
    pub return_location_id: Option<Uuid>,
}
