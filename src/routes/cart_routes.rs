use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::{ApiResponse, RentalSelectionRequest};
use crate::models::{Actor, CartItem, ReservationGroupDetail};
use crate::services::{CartService, CartView, CheckoutService};
use crate::state::AppState;
use crate::utils::errors::AppResult;

pub fn create_cart_router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart))
        .route("/items", post(add_item))
        .route("/items/:id", delete(remove_item))
        .route("/checkout", post(checkout))
}

async fn view_cart(State(state): State<AppState>, actor: Actor) -> AppResult<Json<ApiResponse<CartView>>> {
    let view = CartService::new(&state.booking).view(&actor).await?;
    Ok(Json(ApiResponse::success(view)))
}

async fn add_item(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<RentalSelectionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CartItem>>)> {
    let item = CartService::new(&state.booking).add_item(&actor, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(item, "Added to cart")),
    ))
}

async fn remove_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    CartService::new(&state.booking).remove_item(&actor, id).await?;
    Ok(Json(ApiResponse::success_with_message((), "Removed from cart")))
}

async fn checkout(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<(StatusCode, Json<ApiResponse<ReservationGroupDetail>>)> {
    let detail = CheckoutService::new(&state.booking).checkout(&actor).await?;
    let message = match &detail.group.reference {
        Some(reference) => format!("Reservation {} created", reference),
        None => "Reservation created".to_string(),
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(detail, message)),
    ))
}
