// src/routes/availability_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    availability::{AvailabilityManager, WindowUpdate},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiResponse, AppState, AvailabilityWindowRow},
    policy::{Action, Owner, authorize},
    routes::{caller, target_doctor},
    time_range::{de_opt_time, de_time},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/availability", get(list_availability).post(publish_availability))
        .route(
            "/availability/{window_id}",
            put(update_availability).delete(remove_availability),
        )
}

fn manager(state: &AppState) -> AvailabilityManager<'_> {
    AvailabilityManager::new(&state.db, state.window_removal_policy)
}

/* ============================================================
   POST /availability
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishWindowRequest {
    pub doctor_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(deserialize_with = "de_time")]
    pub start_time: NaiveTime,
    #[serde(deserialize_with = "de_time")]
    pub end_time: NaiveTime,
}

pub async fn publish_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<PublishWindowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AvailabilityWindowRow>>), ApiError> {
    let me = caller(&state, &auth).await?;
    let doctor_id = target_doctor(&me, req.doctor_id)?;
    authorize(&me, Action::PublishAvailability, &Owner::doctor(doctor_id))?;

    let row = manager(&state)
        .publish(doctor_id, req.date, req.start_time, req.end_time)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created("Calendar availability created successfully", row)),
    ))
}

/* ============================================================
   GET /availability?doctorId=&date=
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWindowsQuery {
    pub doctor_id: Option<Uuid>,
    pub date: NaiveDate,
}

pub async fn list_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListWindowsQuery>,
) -> Result<Json<ApiResponse<Vec<AvailabilityWindowRow>>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let doctor_id = target_doctor(&me, q.doctor_id)?;
    authorize(&me, Action::ViewAvailability, &Owner::doctor(doctor_id))?;

    let rows = manager(&state).list(doctor_id, q.date).await?;

    Ok(Json(ApiResponse::ok("Calendar availability fetched successfully", rows)))
}

/* ============================================================
   PUT /availability/{window_id}
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWindowRequest {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "de_opt_time")]
    pub end_time: Option<NaiveTime>,
}

impl From<UpdateWindowRequest> for WindowUpdate {
    fn from(r: UpdateWindowRequest) -> Self {
        WindowUpdate {
            doctor_id: r.doctor_id,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
        }
    }
}

pub async fn update_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(window_id): Path<Uuid>,
    Json(req): Json<UpdateWindowRequest>,
) -> Result<Json<ApiResponse<AvailabilityWindowRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let mgr = manager(&state);

    let current = mgr.get(window_id).await?;
    authorize(&me, Action::UpdateAvailability, &Owner::doctor(current.doctor_id))?;
    if let Some(new_doctor) = req.doctor_id {
        authorize(&me, Action::UpdateAvailability, &Owner::doctor(new_doctor))?;
    }

    let row = mgr.update(window_id, &req.into()).await?;

    Ok(Json(ApiResponse::ok("Calendar availability updated successfully", row)))
}

/* ============================================================
   DELETE /availability/{window_id}
   ============================================================ */

pub async fn remove_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(window_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AvailabilityWindowRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let mgr = manager(&state);

    let current = mgr.get(window_id).await?;
    authorize(&me, Action::RemoveAvailability, &Owner::doctor(current.doctor_id))?;

    let row = mgr.remove(window_id).await?;

    Ok(Json(ApiResponse::ok("Calendar availability deleted successfully", row)))
}
