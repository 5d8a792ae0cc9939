use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ScheduleError, db_internal};
use crate::middleware::auth_context::AuthContext;
use crate::models::Role;

/// Maps a user account to the doctor or patient profile linked to it.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn resolve_doctor_id(&self, user_id: Uuid) -> Result<Uuid, ScheduleError>;
    async fn resolve_patient_id(&self, user_id: Uuid) -> Result<Uuid, ScheduleError>;
}

pub struct PgOwnerDirectory<'a> {
    pub db: &'a PgPool,
}

#[async_trait]
impl<'a> OwnerDirectory for PgOwnerDirectory<'a> {
    async fn resolve_doctor_id(&self, user_id: Uuid) -> Result<Uuid, ScheduleError> {
        sqlx::query_scalar::<_, Uuid>(r#"SELECT doctor_id FROM doctor WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(self.db)
            .await
            .map_err(db_internal)?
            .ok_or_else(|| ScheduleError::NotFound("no doctor profile is linked to this account".into()))
    }

    async fn resolve_patient_id(&self, user_id: Uuid) -> Result<Uuid, ScheduleError> {
        sqlx::query_scalar::<_, Uuid>(r#"SELECT patient_id FROM patient WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(self.db)
            .await
            .map_err(db_internal)?
            .ok_or_else(|| ScheduleError::NotFound("no patient profile is linked to this account".into()))
    }
}

/// A verified caller together with the profile its account owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

/// Doctors and patients must have a linked profile; staff need none.
pub async fn identify(
    directory: &dyn OwnerDirectory,
    auth: &AuthContext,
) -> Result<Identity, ScheduleError> {
    tracing::debug!(
        user_id = %auth.user_id,
        session = %auth.session_token_id,
        "resolving caller identity"
    );

    let (doctor_id, patient_id) = match auth.role {
        Role::Doctor => (Some(directory.resolve_doctor_id(auth.user_id).await?), None),
        Role::Patient => (None, Some(directory.resolve_patient_id(auth.user_id).await?)),
        Role::Admin | Role::Manager | Role::Receptionist => (None, None),
    };

    Ok(Identity {
        user_id: auth.user_id,
        role: auth.role,
        doctor_id,
        patient_id,
    })
}
