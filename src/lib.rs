//! Núcleo de reservas de alquiler de vehículos
//!
//! Catálogo, precios, disponibilidad, carrito, checkout, máquina de estados
//! y payment intents sobre PostgreSQL, con una API HTTP fina en Axum.

pub mod config;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use state::AppState;
