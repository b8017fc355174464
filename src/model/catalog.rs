use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{SerialId, Timestamp};

/// Name-only lookup tables: activities booked on timesheets and roles held in assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Catalog {
    Activity,
    Role,
}

impl Catalog {
    pub fn table(&self) -> &'static str {
        match self {
            Catalog::Activity => "activity",
            Catalog::Role => "role",
        }
    }

    pub fn max_name_len(&self) -> usize {
        match self {
            Catalog::Activity => 100,
            Catalog::Role => 30,
        }
    }

    pub fn name_constraint(&self) -> &'static str {
        match self {
            Catalog::Activity => "activity_name_key",
            Catalog::Role => "role_name_key",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: SerialId,
    pub name: String,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogInput {
    pub name: Option<String>,
    pub version: Option<i32>,
}
