//! Máquina de estados de los grupos de reserva
//!
//! Único sitio donde cambia `ReservationGroup::status`. Orden de una
//! transición: bloquear el grupo, comprobar permiso, comprobar el estado de
//! origen, efectos dentro de la transacción, commit y por último notificar.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Actor, ReservationGroup, ReservationStatus, VehicleReservation};
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::notification_service::notify_status_change;
use crate::services::payment_service::cancel_open_intents;
use crate::services::permission_service::{require, BookingAction, PermissionTarget};
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    Approve,
    Reject,
    Cancel,
    Complete,
}

/// Regla de una acción: desde dónde, hacia dónde y qué efectos tiene
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub allowed_from: &'static [ReservationStatus],
    pub target: ReservationStatus,
    pub permission: BookingAction,
    pub cancels_payment_intents: bool,
    pub revalidates_availability: bool,
}

impl TransitionAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(TransitionAction::Approve),
            "reject" => Some(TransitionAction::Reject),
            "cancel" => Some(TransitionAction::Cancel),
            "complete" => Some(TransitionAction::Complete),
            _ => None,
        }
    }

    pub fn rule(&self) -> TransitionRule {
        use ReservationStatus::*;
        match self {
            TransitionAction::Approve => TransitionRule {
                allowed_from: &[Pending],
                target: AwaitingPayment,
                permission: BookingAction::Approve,
                cancels_payment_intents: false,
                revalidates_availability: true,
            },
            TransitionAction::Reject => TransitionRule {
                allowed_from: &[Pending],
                target: Rejected,
                permission: BookingAction::Reject,
                cancels_payment_intents: true,
                revalidates_availability: false,
            },
            TransitionAction::Cancel => TransitionRule {
                allowed_from: &[Pending, AwaitingPayment],
                target: Canceled,
                permission: BookingAction::Cancel,
                cancels_payment_intents: true,
                revalidates_availability: false,
            },
            TransitionAction::Complete => TransitionRule {
                allowed_from: &[AwaitingPayment],
                target: Completed,
                permission: BookingAction::Complete,
                cancels_payment_intents: false,
                revalidates_availability: false,
            },
        }
    }
}

/// Escribir el nuevo estado si cambia. Devuelve `(viejo, nuevo)` para notificar tras el commit.
pub(crate) async fn apply_status(
    tx: &mut dyn BookingTx,
    group: &mut ReservationGroup,
    target: ReservationStatus,
) -> AppResult<Option<(ReservationStatus, ReservationStatus)>> {
    let old = group.status;
    if old == target {
        return Ok(None);
    }
    tx.update_group_status(group.id, target).await?;
    group.status = target;
    Ok(Some((old, target)))
}

/// Línea cuyo vehículo se borró del catálogo mientras el grupo seguía pendiente
pub(crate) fn vehicle_removed_error(group: &ReservationGroup, line: &VehicleReservation) -> AppError {
    AppError::Conflict(format!(
        "{} is no longer in the fleet; remove it from reservation {} first.",
        line.vehicle_name,
        group.label()
    ))
}

/// Comprobar, con los vehículos bloqueados, que todas las líneas conservan su
/// vehículo y que ninguna choca con reservas bloqueantes de otros grupos
async fn revalidate_group_availability(tx: &mut dyn BookingTx, group: &ReservationGroup) -> AppResult<()> {
    let lines = tx.group_reservations(group.id).await?;
    let mut vehicle_ids: Vec<Uuid> = lines.iter().filter_map(|l| l.vehicle_id).collect();
    vehicle_ids.sort();
    vehicle_ids.dedup();
    tx.lock_vehicles(&vehicle_ids).await?;

    for line in &lines {
        let Some(vehicle_id) = line.vehicle_id else {
            return Err(vehicle_removed_error(group, line));
        };
        if tx
            .has_blocking_conflict(vehicle_id, line.start_date, line.end_date, Some(group.id))
            .await?
        {
            return Err(AppError::VehicleUnavailable {
                vehicle_id,
                vehicle_name: line.vehicle_name.clone(),
                start_date: line.start_date,
                end_date: line.end_date,
            });
        }
    }
    Ok(())
}

pub struct StatusMachine<'a> {
    ctx: &'a BookingContext,
}

impl<'a> StatusMachine<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all, fields(group_id = %group_id, action = action, actor = %actor.user_id))]
    pub async fn transition(&self, group_id: Uuid, action: &str, actor: &Actor) -> AppResult<ReservationGroup> {
        let action = TransitionAction::parse(action)
            .ok_or_else(|| AppError::Transition(format!("Unknown action '{}'.", action)))?;
        let rule = action.rule();

        let mut tx = self.ctx.repo.begin().await?;
        let mut group = tx
            .lock_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {} not found", group_id)))?;

        require(
            self.ctx.policy.as_ref(),
            actor,
            rule.permission,
            PermissionTarget::OwnedBy(group.user_id),
        )?;

        if !rule.allowed_from.contains(&group.status) {
            return Err(AppError::Transition(format!(
                "Reservation {} cannot go from {} to {}.",
                group.label(),
                group.status,
                rule.target
            )));
        }

        if rule.revalidates_availability {
            revalidate_group_availability(tx.as_mut(), &group).await?;
        }
        if rule.cancels_payment_intents {
            cancel_open_intents(tx.as_mut(), group.id, self.ctx.clock.now()).await?;
        }

        let change = apply_status(tx.as_mut(), &mut group, rule.target).await?;
        tx.commit().await?;

        if let Some((old, new)) = change {
            info!("🔁 Reservation {}: {} -> {}", group.label(), old, new);
            notify_status_change(self.ctx.notifier.as_ref(), &group, old, new, Some(actor.user_id)).await;
        }
        Ok(group)
    }
}
