use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Filters, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub activated: Option<bool>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

impl User {
    /// Apply the supplied profile fields of a patch; the password is hashed separately
    pub fn merge(&mut self, input: &UserInput) {
        if let Some(email) = &input.email {
            self.email = email.clone();
        }
        if let Some(first_name) = &input.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &input.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(activated) = input.activated {
            self.activated = activated;
        }
    }
}

/// Hash a plaintext password with bcrypt off the async executor
pub async fn hash_password(plaintext: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, bcrypt::DEFAULT_COST))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash password")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

impl UserQuery {
    pub const SORT_SAFELIST: [&'static str; 4] = ["id", "email", "first_name", "last_name"];

    pub fn filters(&self) -> Filters {
        Filters::new(self.page, self.page_size, self.sort.clone(), &Self::SORT_SAFELIST)
    }

    pub fn has_filters(&self) -> bool {
        self.email.is_some() || self.first_name.is_some() || self.last_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_password_verifies() {
        let hash = hash_password("correct horse".to_string()).await.unwrap();
        assert_ne!(hash, "correct horse");
        assert!(bcrypt::verify("correct horse", &hash).unwrap());
        assert!(!bcrypt::verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let user = User {
            id: "abcd1234".to_string(),
            email: "jane@example.com".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            activated: false,
            version: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "jane@example.com");
    }
}
