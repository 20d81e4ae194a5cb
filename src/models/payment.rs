//! Modelo de PaymentIntent
//!
//! Registro contable de lo que se debe por un grupo de reservas y del ciclo
//! de vida de su pago. El importe va en unidades menores (céntimos).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del intent - mapea al ENUM payment_intent_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "payment_intent_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresConfirmation,
    Processing,
    Succeeded,
    Canceled,
    Failed,
    Expired,
}

impl PaymentIntentStatus {
    pub const OPEN: [PaymentIntentStatus; 2] = [
        PaymentIntentStatus::RequiresConfirmation,
        PaymentIntentStatus::Processing,
    ];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Canceled => "canceled",
            PaymentIntentStatus::Failed => "failed",
            PaymentIntentStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub group_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub client_secret: String,
    pub status: PaymentIntentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Un intent abierto cuya fecha de expiración ya pasó
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && now >= self.expires_at
    }
}

/// Resultado reportado por la pasarela de pago
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Canceled,
}
