//! Notificaciones de reservas
//!
//! Los servicios llaman al `Notifier` solo después de confirmar la
//! transacción; un fallo de entrega nunca deshace una reserva.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{ReservationGroup, ReservationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationEvent {
    #[serde(rename = "reservation.created")]
    ReservationCreated,
    #[serde(rename = "reservation.status_changed")]
    StatusChanged,
    #[serde(rename = "reservation.vehicle_added")]
    VehicleAdded,
    #[serde(rename = "reservation.vehicle_removed")]
    VehicleRemoved,
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::ReservationCreated => "reservation.created",
            NotificationEvent::StatusChanged => "reservation.status_changed",
            NotificationEvent::VehicleAdded => "reservation.vehicle_added",
            NotificationEvent::VehicleRemoved => "reservation.vehicle_removed",
            NotificationEvent::PaymentSucceeded => "payment.succeeded",
            NotificationEvent::PaymentFailed => "payment.failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub group_id: Uuid,
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<ReservationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<ReservationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<Uuid>,
}

impl NotificationPayload {
    pub fn for_group(group: &ReservationGroup) -> Self {
        Self {
            group_id: group.id,
            reference: group.reference.clone(),
            old_status: None,
            new_status: None,
            reservation_id: None,
            actor_user_id: None,
        }
    }

    pub fn status_change(mut self, old: ReservationStatus, new: ReservationStatus) -> Self {
        self.old_status = Some(old);
        self.new_status = Some(new);
        self
    }

    pub fn reservation(mut self, reservation_id: Uuid) -> Self {
        self.reservation_id = Some(reservation_id);
        self
    }

    pub fn actor(mut self, actor_user_id: Option<Uuid>) -> Self {
        self.actor_user_id = actor_user_id;
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent, payload: NotificationPayload);
}

/// Escribe cada evento como línea de log estructurada
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotificationEvent, payload: NotificationPayload) {
        info!(
            event = event.as_str(),
            group_id = %payload.group_id,
            reference = payload.reference.as_deref().unwrap_or("-"),
            old_status = ?payload.old_status,
            new_status = ?payload.new_status,
            reservation_id = ?payload.reservation_id,
            actor = ?payload.actor_user_id,
            "📣 notification"
        );
    }
}

/// Guarda los eventos en memoria para inspeccionarlos en tests
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<(NotificationEvent, NotificationPayload)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NotificationEvent, NotificationPayload)> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: NotificationEvent) -> usize {
        self.events.lock().iter().filter(|(e, _)| *e == event).count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, event: NotificationEvent, payload: NotificationPayload) {
        self.events.lock().push((event, payload));
    }
}

/// Notificar un cambio de estado solo si el valor cambió de verdad
pub async fn notify_status_change(
    notifier: &dyn Notifier,
    group: &ReservationGroup,
    old: ReservationStatus,
    new: ReservationStatus,
    actor_user_id: Option<Uuid>,
) {
    if old == new {
        return;
    }
    let payload = NotificationPayload::for_group(group)
        .status_change(old, new)
        .actor(actor_user_id);
    notifier.notify(NotificationEvent::StatusChanged, payload).await;
}
