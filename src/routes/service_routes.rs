// src/routes/service_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::{
    db::{ConstraintViolation, constraint_violation},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiResponse, AppState, ServiceRow},
    policy::{Action, Owner, authorize},
    routes::{caller, target_doctor},
};

const SERVICE_COLUMNS: &str =
    "service_id, doctor_id, name, description, price_cents, duration_min, created_at, updated_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/{service_id}",
            get(get_service).patch(update_service).delete(delete_service),
        )
}

fn db_error(e: sqlx::Error) -> ApiError {
    tracing::error!("db error: {e}");
    ApiError::Internal(format!("db error: {e}"))
}

fn service_not_found() -> ApiError {
    ApiError::NotFound("NOT_FOUND", "service not found".into())
}

fn validate_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if name.len() > 128 {
        return Err(ApiError::validation("name is too long (max 128)"));
    }
    Ok(name)
}

fn validate_price(price_cents: i32) -> Result<(), ApiError> {
    if price_cents < 0 {
        return Err(ApiError::validation("priceCents must be >= 0"));
    }
    Ok(())
}

fn validate_duration(duration_min: i32) -> Result<(), ApiError> {
    if duration_min <= 0 {
        return Err(ApiError::validation("durationMin must be > 0"));
    }
    Ok(())
}

async fn load_service(state: &AppState, service_id: Uuid) -> Result<ServiceRow, ApiError> {
    sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM service WHERE service_id = $1"
    ))
    .bind(service_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(service_not_found)
}

/* ============================================================
   POST /services
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub doctor_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    pub duration_min: i32,
}

pub async fn create_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ServiceRow>>), ApiError> {
    let me = caller(&state, &auth).await?;
    let doctor_id = target_doctor(&me, req.doctor_id)?;
    authorize(&me, Action::ManageService, &Owner::doctor(doctor_id))?;

    let name = validate_name(&req.name)?;
    validate_price(req.price_cents)?;
    validate_duration(req.duration_min)?;

    let row = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"
        INSERT INTO service (doctor_id, name, description, price_cents, duration_min)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SERVICE_COLUMNS}
        "#
    ))
    .bind(doctor_id)
    .bind(name)
    .bind(req.description.as_deref())
    .bind(req.price_cents)
    .bind(req.duration_min)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match constraint_violation(&e) {
        Some(ConstraintViolation::ForeignKey) => {
            ApiError::NotFound("NOT_FOUND", "doctor not found".into())
        }
        _ => db_error(e),
    })?;

    tracing::info!(service_id = %row.service_id, %doctor_id, "service created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created("Service created successfully", row)),
    ))
}

/* ============================================================
   GET /services
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListServicesQuery {
    pub doctor_id: Option<Uuid>,
}

pub async fn list_services(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListServicesQuery>,
) -> Result<Json<ApiResponse<Vec<ServiceRow>>>, ApiError> {
    let me = caller(&state, &auth).await?;
    authorize(
        &me,
        Action::ViewService,
        &Owner {
            doctor_id: q.doctor_id,
            patient_id: None,
        },
    )?;

    let rows: Vec<ServiceRow> = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"
        SELECT {SERVICE_COLUMNS}
        FROM service
        WHERE ($1::uuid IS NULL OR doctor_id = $1)
        ORDER BY name ASC
        "#
    ))
    .bind(q.doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(ApiResponse::ok("Services retrieved successfully", rows)))
}

pub async fn get_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(service_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ServiceRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let row = load_service(&state, service_id).await?;
    authorize(&me, Action::ViewService, &Owner::doctor(row.doctor_id))?;

    Ok(Json(ApiResponse::ok("Service retrieved successfully", row)))
}

/* ============================================================
   PATCH /services/{id}
   ============================================================ */

/// Absent keeps the field, `null` clears it.
fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub description: Option<Option<String>>,
    pub price_cents: Option<i32>,
    pub duration_min: Option<i32>,
}

pub async fn update_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(service_id): Path<Uuid>,
    Json(req): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<ServiceRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let current = load_service(&state, service_id).await?;
    authorize(&me, Action::ManageService, &Owner::doctor(current.doctor_id))?;

    let name = req.name.as_deref().map(validate_name).transpose()?;
    if let Some(p) = req.price_cents {
        validate_price(p)?;
    }
    if let Some(d) = req.duration_min {
        validate_duration(d)?;
    }

    let row = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"
        UPDATE service
        SET
          name         = COALESCE($2, name),
          description  = CASE WHEN $6 THEN $3 ELSE description END,
          price_cents  = COALESCE($4, price_cents),
          duration_min = COALESCE($5, duration_min),
          updated_at   = now()
        WHERE service_id = $1
        RETURNING {SERVICE_COLUMNS}
        "#
    ))
    .bind(service_id)
    .bind(name)
    .bind(req.description.clone().flatten())
    .bind(req.price_cents)
    .bind(req.duration_min)
    .bind(req.description.is_some())
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(service_not_found)?;

    Ok(Json(ApiResponse::ok("Service updated successfully", row)))
}

/* ============================================================
   DELETE /services/{id}
   ============================================================ */

pub async fn delete_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(service_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ServiceRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let current = load_service(&state, service_id).await?;
    authorize(&me, Action::ManageService, &Owner::doctor(current.doctor_id))?;

    let row = sqlx::query_as::<_, ServiceRow>(&format!(
        "DELETE FROM service WHERE service_id = $1 RETURNING {SERVICE_COLUMNS}"
    ))
    .bind(service_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| match constraint_violation(&e) {
        Some(ConstraintViolation::ForeignKey) => ApiError::Conflict(
            "SERVICE_IN_USE",
            "service is referenced by existing appointments".into(),
        ),
        _ => db_error(e),
    })?
    .ok_or_else(service_not_found)?;

    tracing::info!(%service_id, "service deleted");

    Ok(Json(ApiResponse::ok("Service deleted successfully", row)))
}
