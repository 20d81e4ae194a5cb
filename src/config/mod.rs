//! Configuración del proyecto
//!
//! Este módulo contiene la configuración de base de datos, variables de entorno
//! y reglas de negocio de reservas.

pub mod database;
pub mod environment;

pub use database::DatabaseConfig;
pub use environment::*;
