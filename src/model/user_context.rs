use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller identity taken from request headers, recorded in mutation logs.
///
/// Authentication happens upstream; this is trusted as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
}

impl UserContext {
    pub fn new(user_id: String, user_email: Option<String>) -> Self {
        Self { user_id, user_email }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            user_email: None,
        }
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_email {
            Some(email) => write!(f, "{} <{}>", self.user_id, email),
            None => write!(f, "{}", self.user_id),
        }
    }
}
