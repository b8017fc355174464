use serde::{Deserialize, Serialize};

use crate::model::{SerialId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: SerialId,
    pub name: String,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub note: Option<String>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Request body for creating or patching a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientInput {
    pub name: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub note: Option<String>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub name: String,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub note: Option<String>,
}

impl ClientInput {
    pub fn into_new_client(self) -> NewClient {
        NewClient {
            name: self.name.unwrap_or_default(),
            address: self.address,
            logo_url: self.logo_url,
            note: self.note,
        }
    }
}

impl Client {
    /// Apply the supplied fields of a patch onto this client
    pub fn merge(&mut self, input: &ClientInput) {
        if let Some(name) = &input.name {
            self.name = name.clone();
        }
        if input.address.is_some() {
            self.address = input.address.clone();
        }
        if input.logo_url.is_some() {
            self.logo_url = input.logo_url.clone();
        }
        if input.note.is_some() {
            self.note = input.note.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

impl NameQuery {
    pub const SORT_SAFELIST: [&'static str; 2] = ["id", "name"];

    pub fn filters(&self) -> crate::model::Filters {
        crate::model::Filters::new(self.page, self.page_size, self.sort.clone(), &Self::SORT_SAFELIST)
    }
}
