//! Edición y consulta de grupos de reserva
//!
//! Las líneas solo se añaden o quitan mientras el grupo está abierto
//! (pending / awaiting_payment). Cualquier cambio invalida el importe de los
//! payment intents abiertos, que se cancelan.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::dto::RentalSelectionRequest;
use crate::models::reservation::ranges_overlap;
use crate::models::{Actor, ReservationGroup, ReservationGroupDetail, VehicleReservation};
use crate::services::cart_service::validate_selection;
use crate::services::checkout_service::build_line;
use crate::services::context::BookingContext;
use crate::services::notification_service::{NotificationEvent, NotificationPayload};
use crate::services::payment_service::cancel_open_intents;
use crate::services::permission_service::{require, BookingAction, PermissionTarget};
use crate::utils::errors::{not_found_error, AppError, AppResult};

fn ensure_editable(group: &ReservationGroup) -> AppResult<()> {
    if group.status.is_open() {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Reservation {} is {} and can no longer be edited.",
            group.label(),
            group.status
        )))
    }
}

pub struct ReservationService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> ReservationService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all, fields(group_id = %group_id, vehicle_id = %request.vehicle_id))]
    pub async fn add_vehicle_to_reservation(
        &self,
        actor: &Actor,
        group_id: Uuid,
        request: &RentalSelectionRequest,
    ) -> AppResult<VehicleReservation> {
        let mut tx = self.ctx.repo.begin().await?;
        let group = tx
            .lock_group(group_id)
            .await?
            .ok_or_else(|| not_found_error("Reservation", &group_id))?;

        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::AddVehicle,
            PermissionTarget::OwnedBy(group.user_id),
        )?;
        ensure_editable(&group)?;

        let selection = validate_selection(
            tx.as_mut(),
            request,
            self.ctx.clock.today(),
            self.ctx.config.max_rental_days,
        )
        .await?;
        let vehicle = &selection.vehicle;
        let (start, end) = (request.start_date, request.end_date);

        tx.lock_vehicles(&[vehicle.id]).await?;
        let own_clash = tx
            .group_reservations(group.id)
            .await?
            .iter()
            .any(|r| r.vehicle_id == Some(vehicle.id) && ranges_overlap(r.start_date, r.end_date, start, end));
        if own_clash || tx.has_blocking_conflict(vehicle.id, start, end, None).await? {
            return Err(AppError::VehicleUnavailable {
                vehicle_id: vehicle.id,
                vehicle_name: vehicle.name.clone(),
                start_date: start,
                end_date: end,
            });
        }

        let line = build_line(
            &group,
            vehicle,
            &selection.pickup,
            &selection.return_location,
            start,
            end,
            &self.ctx.config.currency,
        );
        tx.insert_reservation(&line).await?;
        cancel_open_intents(tx.as_mut(), group.id, self.ctx.clock.now()).await?;
        tx.commit().await?;

        info!("➕ {} added to reservation {}", vehicle.name, group.label());
        self.ctx
            .notifier
            .notify(
                NotificationEvent::VehicleAdded,
                NotificationPayload::for_group(&group)
                    .reservation(line.id)
                    .actor(Some(actor.user_id)),
            )
            .await;
        Ok(line)
    }

    #[instrument(skip_all, fields(reservation_id = %reservation_id))]
    pub async fn remove_reservation(&self, actor: &Actor, reservation_id: Uuid) -> AppResult<ReservationGroupDetail> {
        let mut tx = self.ctx.repo.begin().await?;
        let line = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or_else(|| not_found_error("Reservation line", &reservation_id))?;
        let group = tx
            .lock_group(line.group_id)
            .await?
            .ok_or_else(|| not_found_error("Reservation", &line.group_id))?;

        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::RemoveLine,
            PermissionTarget::OwnedBy(group.user_id),
        )?;
        ensure_editable(&group)?;

        let lines = tx.group_reservations(group.id).await?;
        if lines.len() <= 1 {
            return Err(AppError::Conflict(format!(
                "{} is the only vehicle in reservation {}; cancel the reservation instead.",
                line.vehicle_name,
                group.label()
            )));
        }

        tx.delete_reservation(line.id).await?;
        cancel_open_intents(tx.as_mut(), group.id, self.ctx.clock.now()).await?;
        let remaining = tx.group_reservations(group.id).await?;
        tx.commit().await?;

        info!("➖ {} removed from reservation {}", line.vehicle_name, group.label());
        self.ctx
            .notifier
            .notify(
                NotificationEvent::VehicleRemoved,
                NotificationPayload::for_group(&group)
                    .reservation(line.id)
                    .actor(Some(actor.user_id)),
            )
            .await;
        Ok(ReservationGroupDetail::new(group, remaining))
    }

    /// Grupos propios (staff: todos), más recientes primero
    pub async fn list_groups(&self, actor: &Actor) -> AppResult<Vec<ReservationGroupDetail>> {
        let mut tx = self.ctx.repo.begin().await?;
        let owner_filter = if actor.is_staff() { None } else { Some(actor.user_id) };

        let mut details = Vec::new();
        for group in tx.list_groups(owner_filter).await? {
            let reservations = tx.group_reservations(group.id).await?;
            details.push(ReservationGroupDetail::new(group, reservations));
        }
        Ok(details)
    }

    pub async fn get_group(&self, actor: &Actor, group_id: Uuid) -> AppResult<ReservationGroupDetail> {
        let mut tx = self.ctx.repo.begin().await?;
        let group = tx
            .find_group(group_id)
            .await?
            .ok_or_else(|| not_found_error("Reservation", &group_id))?;
        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::ViewGroup,
            PermissionTarget::OwnedBy(group.user_id),
        )?;

        let reservations = tx.group_reservations(group.id).await?;
        Ok(ReservationGroupDetail::new(group, reservations))
    }
}
