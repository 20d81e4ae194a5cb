use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::dto::{ApiResponse, ConfirmPaymentRequest};
use crate::models::PaymentIntent;
use crate::services::{PaymentResult, PaymentService};
use crate::state::AppState;
use crate::utils::errors::AppResult;

// El client secret actúa como credencial del pago: estas rutas no piden actor
pub fn create_payment_router() -> Router<AppState> {
    Router::new()
        .route("/:secret", get(get_intent))
        .route("/:secret/confirm", post(confirm))
}

async fn get_intent(
    State(state): State<AppState>,
    Path(secret): Path<String>,
) -> AppResult<Json<ApiResponse<PaymentIntent>>> {
    let intent = PaymentService::new(&state.booking).get_payment_intent(&secret).await?;
    Ok(Json(ApiResponse::success(intent)))
}

async fn confirm(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentResult>>> {
    let result = PaymentService::new(&state.booking)
        .confirm(state.gateway.as_ref(), &secret, &request.card_number, request.outcome)
        .await?;
    let message = format!("Payment {}", result.intent.status.as_str());
    Ok(Json(ApiResponse::success_with_message(result, message)))
}
