use serde::Deserialize;

use crate::models::PaymentOutcome;

// Confirmación de pago con la pasarela simulada.
// `outcome` fuerza el resultado; si falta, decide el número de tarjeta.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(default)]
    pub card_number: String,
    pub outcome: Option<PaymentOutcome>,
}
