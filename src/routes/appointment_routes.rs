// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    booking::{AppointmentFilter, AppointmentUpdate, BookingManager, BookingRequest},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiResponse, AppState, AppointmentDetail, AppointmentRow, AppointmentStatus, Role},
    owners::Identity,
    policy::{Action, Owner, authorize},
    routes::caller,
    time_range::{de_opt_time, de_time},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(delete_appointment),
        )
}

fn manager(state: &AppState) -> BookingManager<'_> {
    BookingManager::new(&state.db, state.availability_match)
}

/* ============================================================
   POST /appointments (book)
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(deserialize_with = "de_time")]
    pub start_time: NaiveTime,
    #[serde(deserialize_with = "de_time")]
    pub end_time: NaiveTime,
}

impl CreateAppointmentRequest {
    /// Patients always book for themselves. Missing ids become nil and are
    /// rejected by the booking rules.
    pub fn into_booking(self, identity: &Identity) -> BookingRequest {
        let patient_id = match identity.role {
            Role::Patient => identity.patient_id,
            _ => self.patient_id,
        };
        BookingRequest {
            doctor_id: self.doctor_id.unwrap_or_default(),
            patient_id: patient_id.unwrap_or_default(),
            service_id: self.service_id.unwrap_or_default(),
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AppointmentRow>>), ApiError> {
    let me = caller(&state, &auth).await?;
    let booking = req.into_booking(&me);
    authorize(
        &me,
        Action::BookAppointment,
        &Owner::appointment(booking.doctor_id, booking.patient_id),
    )?;

    let row = manager(&state).book(booking).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created("Appointment created successfully", row)),
    ))
}

/* ============================================================
   GET /appointments
   ============================================================ */

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAppointmentsQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Narrow a listing to what the caller may see.
pub fn scoped_filter(identity: &Identity, q: ListAppointmentsQuery) -> Result<AppointmentFilter, ApiError> {
    let mut filter = AppointmentFilter {
        doctor_id: q.doctor_id,
        patient_id: q.patient_id,
        start_date: q.start_date,
        end_date: q.end_date,
    };

    match identity.role {
        Role::Doctor => {
            if filter.doctor_id.is_some_and(|id| Some(id) != identity.doctor_id) {
                return Err(ApiError::forbidden("Doctor can only view their own appointments"));
            }
            filter.doctor_id = identity.doctor_id;
        }
        Role::Patient => {
            if filter.patient_id.is_some_and(|id| Some(id) != identity.patient_id) {
                return Err(ApiError::forbidden("Patient can only view their own appointments"));
            }
            filter.patient_id = identity.patient_id;
        }
        Role::Admin | Role::Manager | Role::Receptionist => {}
    }

    Ok(filter)
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListAppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let filter = scoped_filter(&me, q)?;

    let rows = manager(&state).list(&filter).await?;

    Ok(Json(ApiResponse::ok("Appointments retrieved successfully", rows)))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, ApiError> {
    let me = caller(&state, &auth).await?;

    let detail = manager(&state).fetch(appointment_id).await?;
    authorize(
        &me,
        Action::ViewAppointment,
        &Owner::appointment(detail.appointment.doctor_id, detail.appointment.patient_id),
    )?;

    Ok(Json(ApiResponse::ok("Appointment retrieved successfully", detail)))
}

/* ============================================================
   PATCH /appointments/{id}
   ============================================================ */

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "de_opt_time")]
    pub end_time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
}

impl From<PatchAppointmentRequest> for AppointmentUpdate {
    fn from(r: PatchAppointmentRequest) -> Self {
        AppointmentUpdate {
            doctor_id: r.doctor_id,
            patient_id: r.patient_id,
            service_id: r.service_id,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            status: r.status,
        }
    }
}

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchAppointmentRequest>,
) -> Result<Json<ApiResponse<AppointmentRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let mgr = manager(&state);

    let current = mgr.get(appointment_id).await?;
    authorize(
        &me,
        Action::UpdateAppointment,
        &Owner::appointment(current.doctor_id, current.patient_id),
    )?;

    let update: AppointmentUpdate = req.into();
    let (merged, _) = update.merge(&current);
    authorize(
        &me,
        Action::UpdateAppointment,
        &Owner::appointment(merged.doctor_id, merged.patient_id),
    )?;

    let row = mgr.update(appointment_id, &update).await?;

    Ok(Json(ApiResponse::ok("Appointment updated successfully", row)))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AppointmentRow>>, ApiError> {
    let me = caller(&state, &auth).await?;
    let mgr = manager(&state);

    let current = mgr.get(appointment_id).await?;
    authorize(
        &me,
        Action::RemoveAppointment,
        &Owner::appointment(current.doctor_id, current.patient_id),
    )?;

    let row = mgr.remove(appointment_id).await?;

    Ok(Json(ApiResponse::ok("Appointment deleted successfully", row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role, doctor_id: Option<Uuid>, patient_id: Option<Uuid>) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role,
            doctor_id,
            patient_id,
        }
    }

    fn body(patient_id: Option<Uuid>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            doctor_id: Some(Uuid::new_v4()),
            patient_id,
            service_id: Some(Uuid::new_v4()),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn patient_books_as_themselves() {
        let me = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let booking = body(Some(someone_else)).into_booking(&identity(Role::Patient, None, Some(me)));
        assert_eq!(booking.patient_id, me);
    }

    #[test]
    fn staff_must_name_the_patient() {
        let staff = identity(Role::Receptionist, None, None);
        let booking = body(None).into_booking(&staff);
        assert!(booking.patient_id.is_nil());

        let p = Uuid::new_v4();
        assert_eq!(body(Some(p)).into_booking(&staff).patient_id, p);
    }

    #[test]
    fn booking_body_uses_camel_case() {
        let req: CreateAppointmentRequest = serde_json::from_str(
            r#"{
                "doctorId": "7f0c4a9e-6f57-4c41-9d5a-9a0b7a1d2e33",
                "serviceId": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
                "date": "2024-06-01",
                "startTime": "09:00",
                "endTime": "10:00"
            }"#,
        )
        .unwrap();
        assert!(req.doctor_id.is_some());
        assert!(req.patient_id.is_none());
        assert_eq!(req.end_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn listing_is_scoped_to_caller() {
        let d = Uuid::new_v4();
        let doctor = identity(Role::Doctor, Some(d), None);
        let f = scoped_filter(&doctor, ListAppointmentsQuery::default()).unwrap();
        assert_eq!(f.doctor_id, Some(d));

        let other = ListAppointmentsQuery {
            doctor_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(scoped_filter(&doctor, other).is_err());

        let p = Uuid::new_v4();
        let patient = identity(Role::Patient, None, Some(p));
        let f = scoped_filter(&patient, ListAppointmentsQuery::default()).unwrap();
        assert_eq!(f.patient_id, Some(p));
        assert_eq!(f.doctor_id, None);

        let admin = identity(Role::Admin, None, None);
        let f = scoped_filter(&admin, ListAppointmentsQuery::default()).unwrap();
        assert_eq!(f.doctor_id, None);
        assert_eq!(f.patient_id, None);
    }

    #[test]
    fn patch_body_accepts_status() {
        let req: PatchAppointmentRequest =
            serde_json::from_str(r#"{"status":"CONFIRMED","startTime":"09:15"}"#).unwrap();
        let update: AppointmentUpdate = req.into();
        assert_eq!(update.status, Some(AppointmentStatus::Confirmed));
        assert_eq!(update.start_time, NaiveTime::from_hms_opt(9, 15, 0));
        assert_eq!(update.doctor_id, None);
    }
}
