//! Capability checks for every scheduling operation.
//!
//! A request is allowed or denied from three inputs only: who is asking,
//! what they want to do, and who owns the resource.

use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Role;
use crate::owners::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewAvailability,
    PublishAvailability,
    UpdateAvailability,
    RemoveAvailability,
    BookAppointment,
    ViewAppointment,
    UpdateAppointment,
    RemoveAppointment,
    ViewService,
    ManageService,
}

/// Profiles a resource belongs to. Unknown sides are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl Owner {
    pub fn doctor(doctor_id: Uuid) -> Self {
        Owner {
            doctor_id: Some(doctor_id),
            patient_id: None,
        }
    }

    pub fn appointment(doctor_id: Uuid, patient_id: Uuid) -> Self {
        Owner {
            doctor_id: Some(doctor_id),
            patient_id: Some(patient_id),
        }
    }
}

fn same(mine: Option<Uuid>, theirs: Option<Uuid>) -> bool {
    matches!((mine, theirs), (Some(a), Some(b)) if a == b)
}

pub fn is_allowed(identity: &Identity, action: Action, owner: &Owner) -> bool {
    use Action::*;

    if identity.role.is_staff() {
        return true;
    }

    match identity.role {
        Role::Doctor => match action {
            ViewAvailability | ViewService => true,
            BookAppointment => false,
            PublishAvailability | UpdateAvailability | RemoveAvailability | ManageService
            | ViewAppointment | UpdateAppointment | RemoveAppointment => {
                same(identity.doctor_id, owner.doctor_id)
            }
        },
        Role::Patient => match action {
            ViewAvailability | ViewService => true,
            BookAppointment | ViewAppointment | RemoveAppointment => {
                same(identity.patient_id, owner.patient_id)
            }
            PublishAvailability | UpdateAvailability | RemoveAvailability | ManageService
            | UpdateAppointment => false,
        },
        Role::Admin | Role::Manager | Role::Receptionist => true,
    }
}

pub fn authorize(identity: &Identity, action: Action, owner: &Owner) -> Result<(), ApiError> {
    if is_allowed(identity, action, owner) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %identity.user_id,
            role = ?identity.role,
            ?action,
            "permission denied"
        );
        Err(ApiError::forbidden(format!(
            "You do not have permission to perform {action:?}"
        )))
    }
}
