//! Appointment booking.
//!
//! A booking is admitted only when a published window covers the requested
//! slot, the doctor/patient pair has no appointment starting at the same
//! time, and the service exists. Checks and insert share one transaction
//! under the doctor/day advisory lock; the unique index on
//! `(doctor_id, patient_id, date, start_time)` is the final word on
//! duplicates.

use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::availability::windows_for_day;
use crate::config::AvailabilityMatch;
use crate::db::{LOCK_ATTEMPTS, lock_doctor_day, lock_doctor_days};
use crate::error::{ScheduleError, db_internal};
use crate::models::{
    AppointmentDetail, AppointmentRow, AppointmentStatus, AvailabilityWindowRow, PersonBrief,
};
use crate::time_range::TimeRange;

const APPOINTMENT_COLUMNS: &str = "appointment_id, doctor_id, patient_id, service_id, date, \
     start_time, end_time, status, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Everything the booking rules look at, read in one transaction.
#[derive(Debug)]
pub struct BookingSnapshot<'a> {
    pub windows: &'a [AvailabilityWindowRow],
    pub duplicate: bool,
    pub service_exists: bool,
}

pub fn window_admits(mode: AvailabilityMatch, window: &TimeRange, requested: &TimeRange) -> bool {
    match mode {
        AvailabilityMatch::Exact => window == requested,
        AvailabilityMatch::Containment => window.contains(requested),
    }
}

/// Input checks that need no database access.
pub fn validate_request(req: &BookingRequest) -> Result<TimeRange, ScheduleError> {
    if req.doctor_id.is_nil() || req.patient_id.is_nil() || req.service_id.is_nil() {
        return Err(ScheduleError::InvalidInput(
            "doctorId, patientId and serviceId are required".into(),
        ));
    }
    TimeRange::new(req.start_time, req.end_time)
        .ok_or_else(|| ScheduleError::InvalidInput("startTime must be before endTime".into()))
}

/// Apply the booking rules in priority order: input, availability,
/// duplicate, service. The first failing rule decides the error.
pub fn evaluate(
    mode: AvailabilityMatch,
    req: &BookingRequest,
    snapshot: &BookingSnapshot<'_>,
) -> Result<TimeRange, ScheduleError> {
    let requested = validate_request(req)?;

    let available = snapshot
        .windows
        .iter()
        .filter(|w| w.doctor_id == req.doctor_id && w.date == req.date)
        .any(|w| window_admits(mode, &w.range(), &requested));
    if !available {
        return Err(ScheduleError::doctor_unavailable());
    }

    if snapshot.duplicate {
        return Err(ScheduleError::appointment_exists());
    }

    if !snapshot.service_exists {
        return Err(ScheduleError::NotFound("service not found".into()));
    }

    Ok(requested)
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AppointmentFilter {
    /// The date range only applies when both bounds are given. A reversed
    /// range matches nothing.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.start_date.zip(self.end_date)
    }
}

/// Partial replacement of an appointment.
#[derive(Debug, Clone, Default)]
pub struct AppointmentUpdate {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentUpdate {
    pub fn merge(&self, current: &AppointmentRow) -> (BookingRequest, AppointmentStatus) {
        let merged = BookingRequest {
            doctor_id: self.doctor_id.unwrap_or(current.doctor_id),
            patient_id: self.patient_id.unwrap_or(current.patient_id),
            service_id: self.service_id.unwrap_or(current.service_id),
            date: self.date.unwrap_or(current.date),
            start_time: self.start_time.unwrap_or(current.start_time),
            end_time: self.end_time.unwrap_or(current.end_time),
        };
        (merged, self.status.unwrap_or(current.status))
    }
}

pub fn booking_of(row: &AppointmentRow) -> BookingRequest {
    BookingRequest {
        doctor_id: row.doctor_id,
        patient_id: row.patient_id,
        service_id: row.service_id,
        date: row.date,
        start_time: row.start_time,
        end_time: row.end_time,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentDetailRow {
    #[sqlx(flatten)]
    appointment: AppointmentRow,
    doctor_name: String,
    patient_name: String,
}

impl From<AppointmentDetailRow> for AppointmentDetail {
    fn from(r: AppointmentDetailRow) -> Self {
        AppointmentDetail {
            doctor: PersonBrief {
                id: r.appointment.doctor_id,
                display: r.doctor_name,
            },
            patient: PersonBrief {
                id: r.appointment.patient_id,
                display: r.patient_name,
            },
            appointment: r.appointment,
        }
    }
}

const DETAIL_SELECT: &str = r#"
    SELECT
      a.appointment_id, a.doctor_id, a.patient_id, a.service_id, a.date,
      a.start_time, a.end_time, a.status, a.created_at, a.updated_at,
      d.display_name AS doctor_name,
      p.display_name AS patient_name
    FROM appointment a
    JOIN doctor d ON d.doctor_id = a.doctor_id
    JOIN patient p ON p.patient_id = a.patient_id
"#;

pub struct BookingManager<'a> {
    db: &'a PgPool,
    mode: AvailabilityMatch,
}

impl<'a> BookingManager<'a> {
    pub fn new(db: &'a PgPool, mode: AvailabilityMatch) -> Self {
        Self { db, mode }
    }

    pub async fn book(&self, req: BookingRequest) -> Result<AppointmentRow, ScheduleError> {
        validate_request(&req)?;

        let mut tx = self.db.begin().await.map_err(db_internal)?;
        lock_doctor_day(&mut tx, req.doctor_id, req.date)
            .await
            .map_err(db_internal)?;

        let range = self.check(&mut tx, &req, None).await?;

        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            INSERT INTO appointment (doctor_id, patient_id, service_id, date, start_time, end_time, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(req.doctor_id)
        .bind(req.patient_id)
        .bind(req.service_id)
        .bind(req.date)
        .bind(range.start)
        .bind(range.end)
        .bind(AppointmentStatus::Pending)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ScheduleError::from_db(e, ScheduleError::appointment_exists))?;

        tx.commit().await.map_err(db_internal)?;

        tracing::info!(
            appointment_id = %row.appointment_id,
            doctor_id = %row.doctor_id,
            patient_id = %row.patient_id,
            date = %row.date,
            "appointment booked"
        );
        Ok(row)
    }

    /// Read the snapshot for `req` and apply the booking rules.
    async fn check(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: &BookingRequest,
        exclude: Option<Uuid>,
    ) -> Result<TimeRange, ScheduleError> {
        let windows = windows_for_day(tx, req.doctor_id, req.date).await?;

        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM appointment
              WHERE doctor_id = $1 AND patient_id = $2 AND date = $3 AND start_time = $4
                AND ($5::uuid IS NULL OR appointment_id <> $5)
            )
            "#,
        )
        .bind(req.doctor_id)
        .bind(req.patient_id)
        .bind(req.date)
        .bind(req.start_time)
        .bind(exclude)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_internal)?;

        let service_exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM service WHERE service_id = $1)"#)
                .bind(req.service_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(db_internal)?;

        let snapshot = BookingSnapshot {
            windows: &windows,
            duplicate,
            service_exists,
        };
        evaluate(self.mode, req, &snapshot).inspect_err(|e| {
            tracing::debug!(doctor_id = %req.doctor_id, date = %req.date, "booking rejected: {e}");
        })
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<AppointmentRow, ScheduleError> {
        sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(self.db)
        .await
        .map_err(db_internal)?
        .ok_or_else(appointment_not_found)
    }

    pub async fn fetch(&self, appointment_id: Uuid) -> Result<AppointmentDetail, ScheduleError> {
        sqlx::query_as::<_, AppointmentDetailRow>(&format!(
            "{DETAIL_SELECT} WHERE a.appointment_id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(self.db)
        .await
        .map_err(db_internal)?
        .map(AppointmentDetail::from)
        .ok_or_else(appointment_not_found)
    }

    pub async fn list(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentDetail>, ScheduleError> {
        let range = filter.date_range();

        let rows = sqlx::query_as::<_, AppointmentDetailRow>(&format!(
            r#"
            {DETAIL_SELECT}
            WHERE ($1::uuid IS NULL OR a.doctor_id = $1)
              AND ($2::uuid IS NULL OR a.patient_id = $2)
              AND ($3::date IS NULL OR a.date BETWEEN $3 AND $4)
            ORDER BY a.date ASC, a.start_time ASC
            "#
        ))
        .bind(filter.doctor_id)
        .bind(filter.patient_id)
        .bind(range.map(|(from, _)| from))
        .bind(range.map(|(_, to)| to))
        .fetch_all(self.db)
        .await
        .map_err(db_internal)?;

        Ok(rows.into_iter().map(AppointmentDetail::from).collect())
    }

    /// Scheduling changes are re-checked like a new booking; a status-only
    /// change is applied as is.
    pub async fn update(
        &self,
        appointment_id: Uuid,
        fields: &AppointmentUpdate,
    ) -> Result<AppointmentRow, ScheduleError> {
        for _ in 0..LOCK_ATTEMPTS {
            let seen = self.get(appointment_id).await?;
            let (target, _) = fields.merge(&seen);

            // Day locks first, for the day the appointment leaves and the one
            // it lands on, then the row.
            let mut tx = self.db.begin().await.map_err(db_internal)?;
            lock_doctor_days(
                &mut tx,
                [(seen.doctor_id, seen.date), (target.doctor_id, target.date)],
            )
            .await
            .map_err(db_internal)?;

            let current = sqlx::query_as::<_, AppointmentRow>(&format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1 FOR UPDATE"
            ))
            .bind(appointment_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_internal)?
            .ok_or_else(appointment_not_found)?;

            if current.doctor_id != seen.doctor_id || current.date != seen.date {
                tracing::debug!(%appointment_id, "appointment moved while locking, retrying");
                continue;
            }

            let (merged, status) = fields.merge(&current);
            if merged != booking_of(&current) {
                validate_request(&merged)?;
                self.check(&mut tx, &merged, Some(appointment_id)).await?;
            }

            let row = sqlx::query_as::<_, AppointmentRow>(&format!(
                r#"
                UPDATE appointment
                SET doctor_id = $2, patient_id = $3, service_id = $4, date = $5,
                    start_time = $6, end_time = $7, status = $8, updated_at = now()
                WHERE appointment_id = $1
                RETURNING {APPOINTMENT_COLUMNS}
                "#
            ))
            .bind(appointment_id)
            .bind(merged.doctor_id)
            .bind(merged.patient_id)
            .bind(merged.service_id)
            .bind(merged.date)
            .bind(merged.start_time)
            .bind(merged.end_time)
            .bind(status)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| ScheduleError::from_db(e, ScheduleError::appointment_exists))?;

            tx.commit().await.map_err(db_internal)?;

            tracing::info!(%appointment_id, status = ?row.status, "appointment updated");
            return Ok(row);
        }

        Err(ScheduleError::Conflict(
            "appointment is being modified concurrently".into(),
        ))
    }

    pub async fn remove(&self, appointment_id: Uuid) -> Result<AppointmentRow, ScheduleError> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "DELETE FROM appointment WHERE appointment_id = $1 RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(appointment_id)
        .fetch_optional(self.db)
        .await
        .map_err(db_internal)?
        .ok_or_else(appointment_not_found)?;

        tracing::info!(%appointment_id, "appointment removed");
        Ok(row)
    }
}

fn appointment_not_found() -> ScheduleError {
    ScheduleError::NotFound("appointment not found".into())
}
