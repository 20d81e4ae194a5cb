use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::{ApiResponse, RentalSelectionRequest};
use crate::models::{Actor, PaymentIntent, ReservationGroup, ReservationGroupDetail, VehicleReservation};
use crate::services::{PaymentService, ReservationService, StatusMachine};
use crate::state::AppState;
use crate::utils::errors::AppResult;

pub fn create_reservation_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups))
        .route("/items/:id", delete(remove_item))
        .route("/:id", get(get_group))
        .route("/:id/transitions/:action", post(transition))
        .route("/:id/vehicles", post(add_vehicle))
        .route("/:id/payment-intents", get(list_payment_intents).post(create_payment_intent))
}

async fn list_groups(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<Vec<ReservationGroupDetail>>>> {
    let groups = ReservationService::new(&state.booking).list_groups(&actor).await?;
    Ok(Json(ApiResponse::success(groups)))
}

async fn get_group(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReservationGroupDetail>>> {
    let group = ReservationService::new(&state.booking).get_group(&actor, id).await?;
    Ok(Json(ApiResponse::success(group)))
}

async fn transition(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, action)): Path<(Uuid, String)>,
) -> AppResult<Json<ApiResponse<ReservationGroup>>> {
    let group = StatusMachine::new(&state.booking).transition(id, &action, &actor).await?;
    let message = format!("Reservation {} is now {}", group.label(), group.status);
    Ok(Json(ApiResponse::success_with_message(group, message)))
}

async fn add_vehicle(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<RentalSelectionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<VehicleReservation>>)> {
    let line = ReservationService::new(&state.booking)
        .add_vehicle_to_reservation(&actor, id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(line))))
}

async fn remove_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReservationGroupDetail>>> {
    let group = ReservationService::new(&state.booking)
        .remove_reservation(&actor, id)
        .await?;
    Ok(Json(ApiResponse::success(group)))
}

async fn list_payment_intents(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<PaymentIntent>>>> {
    let intents = PaymentService::new(&state.booking).group_payment_intents(&actor, id).await?;
    Ok(Json(ApiResponse::success(intents)))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<ApiResponse<PaymentIntent>>)> {
    let intent = PaymentService::new(&state.booking)
        .create_payment_intent(&actor, id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(intent))))
}
