#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use vehicle_rental::config::BookingConfig;
use vehicle_rental::dto::{CreateLocationRequest, CreateVehicleRequest, RentalSelectionRequest};
use vehicle_rental::models::{Actor, EngineType, Location, Vehicle, VehicleCategory};
use vehicle_rental::services::{BookingContext, CatalogService, MemoryNotifier};
use vehicle_rental::utils::FixedClock;

pub fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, month, day).unwrap()
}

pub struct TestEnv {
    pub ctx: BookingContext,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<MemoryNotifier>,
    pub staff: Actor,
    pub depot: Location,
    pub airport: Location,
}

/// Contexto en memoria con "hoy" = 2030-06-01 y notificador que graba eventos
pub async fn setup() -> TestEnv {
    let clock = Arc::new(FixedClock::at_date(d(6, 1)));
    let notifier = Arc::new(MemoryNotifier::new());
    let ctx = BookingContext::in_memory(BookingConfig::default())
        .with_clock(clock.clone())
        .with_notifier(notifier.clone());
    let staff = Actor::staff(Uuid::new_v4());

    let catalog = CatalogService::new(&ctx);
    let depot = catalog
        .create_location(&staff, &CreateLocationRequest { name: "Depot".to_string() })
        .await
        .unwrap();
    let airport = catalog
        .create_location(&staff, &CreateLocationRequest { name: "Airport".to_string() })
        .await
        .unwrap();

    TestEnv { ctx, clock, notifier, staff, depot, airport }
}

impl TestEnv {
    pub async fn add_van(&self, name: &str, daily_price: i64) -> Vehicle {
        CatalogService::new(&self.ctx)
            .create_vehicle(
                &self.staff,
                &CreateVehicleRequest {
                    name: name.to_string(),
                    category: VehicleCategory::Van,
                    engine_type: EngineType::Diesel,
                    seats: Some(3),
                    unlimited_seats: false,
                    daily_price: Decimal::from(daily_price),
                    pickup_location_ids: vec![self.depot.id, self.airport.id],
                    return_location_ids: vec![self.depot.id],
                },
            )
            .await
            .unwrap()
    }

    pub fn selection(&self, vehicle: &Vehicle, start: NaiveDate, end: NaiveDate) -> RentalSelectionRequest {
        RentalSelectionRequest {
            vehicle_id: vehicle.id,
            start_date: start,
            end_date: end,
            pickup_location_id: Some(self.depot.id),
            return_location_id: Some(self.depot.id),
        }
    }
}
