use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::{ApiResponse, AvailabilityQuery, CreateLocationRequest, CreateVehicleRequest, QuoteQuery};
use crate::models::{Actor, Location, Vehicle};
use crate::services::{AvailabilityService, AvailableVehicle, CatalogService, Quote};
use crate::state::AppState;
use crate::utils::errors::AppResult;

pub fn create_vehicle_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vehicles).post(create_vehicle))
        .route("/available", get(search_available))
        .route("/:id", get(get_vehicle).delete(delete_vehicle))
        .route("/:id/quote", get(quote_vehicle))
}

pub fn create_location_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route("/:id", delete(delete_location))
}

async fn list_vehicles(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Vehicle>>>> {
    let vehicles = CatalogService::new(&state.booking).list_vehicles().await?;
    Ok(Json(ApiResponse::success(vehicles)))
}

async fn create_vehicle(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateVehicleRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Vehicle>>)> {
    let vehicle = CatalogService::new(&state.booking).create_vehicle(&actor, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(vehicle, "Vehicle created")),
    ))
}

async fn get_vehicle(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<ApiResponse<Vehicle>>> {
    let vehicle = CatalogService::new(&state.booking).get_vehicle(id).await?;
    Ok(Json(ApiResponse::success(vehicle)))
}

async fn delete_vehicle(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    CatalogService::new(&state.booking).delete_vehicle(&actor, id).await?;
    Ok(Json(ApiResponse::success_with_message((), "Vehicle deleted")))
}

async fn quote_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> AppResult<Json<ApiResponse<Quote>>> {
    let quote = CatalogService::new(&state.booking)
        .quote_vehicle(id, query.start_date, query.end_date)
        .await?;
    Ok(Json(ApiResponse::success(quote)))
}

async fn search_available(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<ApiResponse<Vec<AvailableVehicle>>>> {
    let vehicles = AvailabilityService::new(&state.booking)
        .search(
            query.start_date,
            query.end_date,
            query.pickup_location_id,
            query.return_location_id,
        )
        .await?;
    Ok(Json(ApiResponse::success(vehicles)))
}

async fn list_locations(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Location>>>> {
    let locations = CatalogService::new(&state.booking).list_locations().await?;
    Ok(Json(ApiResponse::success(locations)))
}

async fn create_location(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateLocationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Location>>)> {
    let location = CatalogService::new(&state.booking).create_location(&actor, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(location, "Location created")),
    ))
}

async fn delete_location(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    CatalogService::new(&state.booking).delete_location(&actor, id).await?;
    Ok(Json(ApiResponse::success_with_message((), "Location deleted")))
}
