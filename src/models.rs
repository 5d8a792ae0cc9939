use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::{AvailabilityMatch, WindowRemovalPolicy};
use crate::time_range::TimeRange;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub availability_match: AvailabilityMatch,
    pub window_removal_policy: WindowRemovalPolicy,
}

/* -------------------------
   API envelope
--------------------------*/

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            status_code: 200,
            message: message.into(),
            data,
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            status_code: 201,
            message: message.into(),
            data,
        }
    }
}

/* -------------------------
   Enums stored as smallint
--------------------------*/

/// 0 Patient, 1 Admin, 2 Manager, 3 Doctor, 4 Receptionist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Admin = 1,
    Manager = 2,
    Doctor = 3,
    Receptionist = 4,
}

impl Role {
    /// Clinic staff act on behalf of any doctor or patient.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Receptionist)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Cancelled = 2,
    Completed = 3,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindowRow {
    pub window_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityWindowRow {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRow {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub display: String,
}

/// An appointment with the doctor and patient it belongs to.
#[derive(Debug, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: AppointmentRow,
    pub doctor: PersonBrief,
    pub patient: PersonBrief,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub service_id: Uuid,
    pub doctor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    pub duration_min: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
