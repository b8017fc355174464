use serde::{Deserialize, Serialize};

use crate::model::{SerialId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(skip)]
    pub internal_id: SerialId,
    pub proposal_id: String,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalInput {
    pub proposal_id: Option<String>,
    pub version: Option<i32>,
}
