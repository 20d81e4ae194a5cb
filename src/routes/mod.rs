//! Rutas HTTP
//!
//! Capa fina sobre los servicios: extraer, delegar y envolver en `ApiResponse`.

pub mod cart_routes;
pub mod payment_routes;
pub mod reservation_routes;
pub mod vehicle_routes;

use axum::{response::Json, routing::get, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::{cors_middleware, cors_middleware_with_origins};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        cors_middleware()
    } else {
        cors_middleware_with_origins(&state.config.cors_origins)
    };

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/vehicles", vehicle_routes::create_vehicle_router())
        .nest("/api/locations", vehicle_routes::create_location_router())
        .nest("/api/cart", cart_routes::create_cart_router())
        .nest("/api/reservations", reservation_routes::create_reservation_router())
        .nest("/api/payments", payment_routes::create_payment_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "vehicle_rental",
        "timestamp": chrono::Utc::now()
    }))
}
