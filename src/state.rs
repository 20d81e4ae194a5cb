//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::services::{BookingContext, MockCardGateway, PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub booking: BookingContext,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(config: EnvironmentConfig, booking: BookingContext) -> Self {
        Self {
            config,
            booking,
            gateway: Arc::new(MockCardGateway),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }
}
