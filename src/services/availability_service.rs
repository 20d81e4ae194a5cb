//! Índice de disponibilidad
//!
//! Un vehículo está libre para `[start, end)` si ninguna de sus líneas en un
//! grupo bloqueante solapa el rango y, cuando se piden, admite las
//! ubicaciones de recogida y devolución. La forma masiva y la individual
//! usan el mismo predicado.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::Vehicle;
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::pricing_service::{quote, Quote};
use crate::utils::errors::AppResult;

async fn free_vehicles(
    tx: &mut dyn BookingTx,
    start: NaiveDate,
    end: NaiveDate,
    pickup: Option<Uuid>,
    return_location: Option<Uuid>,
) -> AppResult<Vec<Vehicle>> {
    if end <= start {
        return Ok(Vec::new());
    }
    let blocked = tx.blocked_vehicle_ids(start, end).await?;
    let vehicles = tx.list_vehicles().await?;
    Ok(vehicles
        .into_iter()
        .filter(|v| v.serves(pickup, return_location) && !blocked.contains(&v.id))
        .collect())
}

/// Ids de los vehículos libres en el rango
pub async fn available_vehicle_ids(
    tx: &mut dyn BookingTx,
    start: NaiveDate,
    end: NaiveDate,
    pickup: Option<Uuid>,
    return_location: Option<Uuid>,
) -> AppResult<HashSet<Uuid>> {
    let vehicles = free_vehicles(tx, start, end, pickup, return_location).await?;
    Ok(vehicles.into_iter().map(|v| v.id).collect())
}

/// Comprobación individual, consistente con `available_vehicle_ids`
pub async fn is_vehicle_available(
    tx: &mut dyn BookingTx,
    vehicle: &Vehicle,
    start: NaiveDate,
    end: NaiveDate,
    pickup: Option<Uuid>,
    return_location: Option<Uuid>,
) -> AppResult<bool> {
    if end <= start || !vehicle.serves(pickup, return_location) {
        return Ok(false);
    }
    let conflict = tx.has_blocking_conflict(vehicle.id, start, end, None).await?;
    Ok(!conflict)
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableVehicle {
    pub vehicle: Vehicle,
    pub quote: Quote,
}

pub struct AvailabilityService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> AvailabilityService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    /// Búsqueda sin bloqueos: vehículos libres con su presupuesto
    pub async fn search(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        pickup: Option<Uuid>,
        return_location: Option<Uuid>,
    ) -> AppResult<Vec<AvailableVehicle>> {
        let mut tx = self.ctx.repo.begin().await?;
        let vehicles = free_vehicles(tx.as_mut(), start, end, pickup, return_location).await?;
        let currency = &self.ctx.config.currency;
        Ok(vehicles
            .into_iter()
            .map(|vehicle| {
                let quote = quote(start, end, vehicle.daily_price, currency);
                AvailableVehicle { vehicle, quote }
            })
            .collect())
    }
}
