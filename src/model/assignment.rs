use serde::{Deserialize, Serialize};

use crate::model::SerialId;

/// Row of the assignment join table: an employee holding a role on a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub project_id: SerialId,
    pub employee_id: String,
    pub role_id: SerialId,
}

/// The part of an assignment owned by the project side of the join
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentMember {
    pub employee_id: String,
    pub role_id: SerialId,
}

impl AssignmentMember {
    pub fn new(employee_id: impl Into<String>, role_id: SerialId) -> Self {
        Self {
            employee_id: employee_id.into(),
            role_id,
        }
    }

    pub fn for_project(&self, project_id: SerialId) -> Assignment {
        Assignment {
            project_id,
            employee_id: self.employee_id.clone(),
            role_id: self.role_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentRequest {
    pub employee_id: Option<String>,
    pub role_id: Option<SerialId>,
}

impl AssignmentRequest {
    /// Present only when both halves were supplied
    pub fn to_member(&self) -> Option<AssignmentMember> {
        match (&self.employee_id, self.role_id) {
            (Some(employee_id), Some(role_id)) => Some(AssignmentMember::new(employee_id.clone(), role_id)),
            _ => None,
        }
    }
}
