//! Dependencias compartidas por los servicios de reservas

use std::sync::Arc;

use crate::config::BookingConfig;
use crate::repositories::{BookingRepository, InMemoryBookingRepository};
use crate::services::notification_service::{Notifier, TracingNotifier};
use crate::services::permission_service::{PermissionPolicy, RolePolicy};
use crate::utils::{Clock, SystemClock};

#[derive(Clone)]
pub struct BookingContext {
    pub repo: Arc<dyn BookingRepository>,
    pub policy: Arc<dyn PermissionPolicy>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub config: BookingConfig,
}

impl BookingContext {
    /// Contexto de producción: política por roles, notificaciones a log, reloj del sistema
    pub fn new(repo: Arc<dyn BookingRepository>, config: BookingConfig) -> Self {
        Self {
            repo,
            policy: Arc::new(RolePolicy),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Contexto sobre el almacén en memoria
    pub fn in_memory(config: BookingConfig) -> Self {
        Self::new(Arc::new(InMemoryBookingRepository::new()), config)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }
}
