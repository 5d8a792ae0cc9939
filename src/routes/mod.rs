use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
    owners::{Identity, PgOwnerDirectory, identify},
};
use axum::{Json, Router, routing::get};
use uuid::Uuid;

pub mod appointment_routes;
pub mod availability_routes;
pub mod service_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", availability_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1/services", service_routes::router())
        .route("/health", get(health))
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct HealthData {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthData> {
    Json(HealthData { status: "ok" })
}

/// Resolve the caller's linked doctor/patient profile.
pub async fn caller(state: &AppState, auth: &AuthContext) -> Result<Identity, ApiError> {
    let directory = PgOwnerDirectory { db: &state.db };
    Ok(identify(&directory, auth).await?)
}

/// Doctors act on their own calendar unless told otherwise; everyone else
/// has to name the doctor.
pub fn target_doctor(identity: &Identity, requested: Option<Uuid>) -> Result<Uuid, ApiError> {
    requested
        .or(identity.doctor_id)
        .ok_or_else(|| ApiError::validation("doctorId is required"))
}
