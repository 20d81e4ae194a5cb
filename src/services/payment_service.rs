//! Libro de payment intents
//!
//! Registra lo que se debe por un grupo y el ciclo de vida de su pago. Un
//! grupo tiene como mucho un intent abierto: abrir uno nuevo cancela los
//! anteriores. Los intents abiertos caducan de forma perezosa cuando una
//! lectura observa `now >= expires_at`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Actor, PaymentIntent, PaymentIntentStatus, PaymentOutcome, ReservationGroup, ReservationStatus,
};
use crate::repositories::BookingTx;
use crate::services::context::BookingContext;
use crate::services::notification_service::{notify_status_change, NotificationEvent, NotificationPayload};
use crate::services::permission_service::{require, BookingAction, PermissionTarget};
use crate::services::pricing_service::to_minor_units;
use crate::services::status_machine::{apply_status, vehicle_removed_error};
use crate::utils::errors::{AppError, AppResult};

const CLIENT_SECRET_BYTES: usize = 24;

/// Cerrar los intents abiertos del grupo: los ya vencidos pasan a `expired`,
/// el resto a `canceled`. Devuelve cuántos se cerraron.
pub(crate) async fn cancel_open_intents(
    tx: &mut dyn BookingTx,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<usize> {
    let open = tx.lock_open_payment_intents(group_id).await?;
    let mut expired = 0;
    for intent in &open {
        let status = if intent.is_due_for_expiry(now) {
            expired += 1;
            PaymentIntentStatus::Expired
        } else {
            PaymentIntentStatus::Canceled
        };
        tx.update_payment_intent_status(intent.id, status).await?;
    }
    if !open.is_empty() {
        info!(
            "💳 Closed {} open payment intent(s) for group {} ({} expired)",
            open.len(),
            group_id,
            expired
        );
    }
    Ok(open.len())
}

fn generate_client_secret() -> String {
    let mut bytes = [0u8; CLIENT_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Pasarela de pago externa
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm(&self, intent: &PaymentIntent, card_number: &str) -> AppResult<PaymentOutcome>;
}

/// Pasarela simulada que decide por número de tarjeta
#[derive(Debug, Default, Clone, Copy)]
pub struct MockCardGateway;

impl MockCardGateway {
    pub const SUCCESS_CARD: &'static str = "4242424242424242";
    pub const DECLINED_CARD: &'static str = "4000000000000002";

    pub fn outcome_for_card(card_number: &str) -> PaymentOutcome {
        let digits: String = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.as_str() {
            Self::DECLINED_CARD => PaymentOutcome::Failed,
            _ => PaymentOutcome::Succeeded,
        }
    }
}

#[async_trait]
impl PaymentGateway for MockCardGateway {
    async fn confirm(&self, intent: &PaymentIntent, card_number: &str) -> AppResult<PaymentOutcome> {
        let outcome = Self::outcome_for_card(card_number);
        info!(
            "💳 Mock gateway: {} {} for intent {} -> {:?}",
            intent.amount_minor, intent.currency, intent.id, outcome
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub intent: PaymentIntent,
    pub group: ReservationGroup,
}

pub struct PaymentService<'a> {
    ctx: &'a BookingContext,
}

impl<'a> PaymentService<'a> {
    pub fn new(ctx: &'a BookingContext) -> Self {
        Self { ctx }
    }

    async fn expire_if_due(&self, tx: &mut dyn BookingTx, intent: &mut PaymentIntent) -> AppResult<bool> {
        if !intent.is_due_for_expiry(self.ctx.clock.now()) {
            return Ok(false);
        }
        tx.update_payment_intent_status(intent.id, PaymentIntentStatus::Expired)
            .await?;
        intent.status = PaymentIntentStatus::Expired;
        info!("⌛ Payment intent {} expired", intent.id);
        Ok(true)
    }

    /// Abrir un intent por el total actual del grupo
    #[instrument(skip_all, fields(user_id = %actor.user_id, group_id = %group_id))]
    pub async fn create_payment_intent(&self, actor: &Actor, group_id: Uuid) -> AppResult<PaymentIntent> {
        let mut tx = self.ctx.repo.begin().await?;
        let group = tx
            .lock_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {} not found", group_id)))?;

        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::CreatePaymentIntent,
            PermissionTarget::OwnedBy(group.user_id),
        )?;

        if group.status != ReservationStatus::AwaitingPayment {
            return Err(AppError::Conflict(format!(
                "Reservation {} is {}; payment is only possible while awaiting_payment.",
                group.label(),
                group.status
            )));
        }

        let total: Decimal = tx
            .group_reservations(group.id)
            .await?
            .iter()
            .map(|r| r.total_price)
            .sum();
        let amount_minor = to_minor_units(total)
            .ok_or_else(|| AppError::Internal(format!("amount {} out of range", total)))?;
        if amount_minor <= 0 {
            return Err(AppError::BadRequest(format!(
                "Reservation {} has nothing to pay.",
                group.label()
            )));
        }

        let now = self.ctx.clock.now();
        cancel_open_intents(tx.as_mut(), group.id, now).await?;

        let expires_at = now + Duration::minutes(self.ctx.config.payment_intent_ttl_minutes);
        for attempt in 1..=self.ctx.config.reference_attempts.max(1) {
            let intent = PaymentIntent {
                id: Uuid::new_v4(),
                group_id: group.id,
                amount_minor,
                currency: self.ctx.config.currency.clone(),
                client_secret: generate_client_secret(),
                status: PaymentIntentStatus::RequiresConfirmation,
                created_at: now,
                expires_at,
            };
            if tx.try_insert_payment_intent(&intent).await? {
                tx.commit().await?;
                info!(
                    "💳 Payment intent {} opened for {}: {} {}",
                    intent.id,
                    group.label(),
                    amount_minor,
                    intent.currency
                );
                return Ok(intent);
            }
            warn!("Client secret collision on attempt {}", attempt);
        }

        Err(AppError::Integrity(
            "could not generate a unique client secret".to_string(),
        ))
    }

    /// Lectura con caducidad perezosa
    pub async fn get_payment_intent(&self, client_secret: &str) -> AppResult<PaymentIntent> {
        let mut tx = self.ctx.repo.begin().await?;
        let mut intent = tx
            .lock_payment_intent(client_secret)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

        if self.expire_if_due(tx.as_mut(), &mut intent).await? {
            tx.commit().await?;
        }
        Ok(intent)
    }

    /// Intents de un grupo, más recientes primero
    pub async fn group_payment_intents(&self, actor: &Actor, group_id: Uuid) -> AppResult<Vec<PaymentIntent>> {
        let mut tx = self.ctx.repo.begin().await?;
        let group = tx
            .find_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {} not found", group_id)))?;
        require(
            self.ctx.policy.as_ref(),
            actor,
            BookingAction::ViewGroup,
            PermissionTarget::OwnedBy(group.user_id),
        )?;

        let mut intents = tx.group_payment_intents(group.id).await?;
        let mut expired_any = false;
        for intent in intents.iter_mut() {
            expired_any |= self.expire_if_due(tx.as_mut(), intent).await?;
        }
        if expired_any {
            tx.commit().await?;
        }
        Ok(intents)
    }

    /// Aplicar el resultado reportado por la pasarela
    #[instrument(skip_all, fields(outcome = ?outcome))]
    pub async fn apply_gateway_outcome(&self, client_secret: &str, outcome: PaymentOutcome) -> AppResult<PaymentResult> {
        let mut tx = self.ctx.repo.begin().await?;

        // Grupo antes que intent, el mismo orden que usan las transiciones
        let group_id = tx
            .find_payment_intent(client_secret)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?
            .group_id;
        let mut group = tx
            .lock_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {} not found", group_id)))?;
        let mut intent = tx
            .lock_payment_intent(client_secret)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

        if self.expire_if_due(tx.as_mut(), &mut intent).await? {
            tx.commit().await?;
            return Err(AppError::Conflict("Payment intent has expired.".to_string()));
        }
        if !intent.status.is_open() {
            return Err(AppError::Conflict(format!(
                "Payment intent is already {}.",
                intent.status.as_str()
            )));
        }
        if group.status != ReservationStatus::AwaitingPayment {
            return Err(AppError::Conflict(format!(
                "Reservation {} is {}; payment is only possible while awaiting_payment.",
                group.label(),
                group.status
            )));
        }
        let lines = tx.group_reservations(group.id).await?;
        if lines.is_empty() {
            return Err(AppError::Conflict(format!("Reservation {} has no vehicles.", group.label())));
        }
        if let Some(line) = lines.iter().find(|l| l.vehicle_id.is_none()) {
            return Err(vehicle_removed_error(&group, line));
        }

        let (intent_status, status_change) = match outcome {
            PaymentOutcome::Succeeded => {
                let change = apply_status(tx.as_mut(), &mut group, ReservationStatus::Reserved).await?;
                (PaymentIntentStatus::Succeeded, change)
            }
            PaymentOutcome::Failed => (PaymentIntentStatus::Failed, None),
            PaymentOutcome::Canceled => (PaymentIntentStatus::Canceled, None),
        };
        tx.update_payment_intent_status(intent.id, intent_status).await?;
        intent.status = intent_status;
        tx.commit().await?;

        let notifier = self.ctx.notifier.as_ref();
        match outcome {
            PaymentOutcome::Succeeded => {
                info!("✅ Payment succeeded for {}", group.label());
                notifier
                    .notify(NotificationEvent::PaymentSucceeded, NotificationPayload::for_group(&group))
                    .await;
            }
            PaymentOutcome::Failed => {
                warn!("Payment failed for {}", group.label());
                notifier
                    .notify(NotificationEvent::PaymentFailed, NotificationPayload::for_group(&group))
                    .await;
            }
            PaymentOutcome::Canceled => info!("Payment canceled for {}", group.label()),
        }
        if let Some((old, new)) = status_change {
            notify_status_change(notifier, &group, old, new, None).await;
        }

        Ok(PaymentResult { intent, group })
    }

    /// Confirmar con la pasarela; `forced` sustituye la decisión de la pasarela
    pub async fn confirm(
        &self,
        gateway: &dyn PaymentGateway,
        client_secret: &str,
        card_number: &str,
        forced: Option<PaymentOutcome>,
    ) -> AppResult<PaymentResult> {
        let intent = self.get_payment_intent(client_secret).await?;
        if !intent.status.is_open() {
            return Err(AppError::Conflict(format!(
                "Payment intent is already {}.",
                intent.status.as_str()
            )));
        }
        let outcome = match forced {
            Some(outcome) => outcome,
            None => gateway.confirm(&intent, card_number).await?,
        };
        self.apply_gateway_outcome(client_secret, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_card_outcomes() {
        assert_eq!(MockCardGateway::outcome_for_card("4242 4242 4242 4242"), PaymentOutcome::Succeeded);
        assert_eq!(MockCardGateway::outcome_for_card("4000-0000-0000-0002"), PaymentOutcome::Failed);
        assert_eq!(MockCardGateway::outcome_for_card("5555555555554444"), PaymentOutcome::Succeeded);
    }

    #[test]
    fn test_client_secret_shape() {
        let secret = generate_client_secret();
        assert_eq!(secret.len(), CLIENT_SECRET_BYTES * 2);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(secret, generate_client_secret());
    }
}
