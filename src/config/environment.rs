//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del servidor y las reglas de negocio
//! de reservas. Todas las variables tienen valor por defecto; un número mal
//! formado se reporta como error al arrancar.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub booking: BookingConfig,
}

/// Reglas de negocio de reservas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfig {
    pub max_rental_days: i64,
    pub currency: String,
    pub payment_intent_ttl_minutes: i64,
    pub reference_attempts: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_rental_days: 60,
            currency: "EUR".to_string(),
            payment_intent_ttl_minutes: 30,
            reference_attempts: 5,
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_rental_days: parse_var("MAX_RENTAL_DAYS", defaults.max_rental_days)?,
            currency: env::var("BOOKING_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or(defaults.currency),
            payment_intent_ttl_minutes: parse_var(
                "PAYMENT_INTENT_TTL_MINUTES",
                defaults.payment_intent_ttl_minutes,
            )?,
            reference_attempts: parse_var("REFERENCE_ATTEMPTS", defaults.reference_attempts)?,
        })
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            booking: BookingConfig::default(),
        }
    }
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            port: parse_var("PORT", 3000)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            booking: BookingConfig::from_env()?,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
