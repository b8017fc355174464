use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::logic::validate::ValidationErrors;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Tables whose unique constraints follow the `{table}_{column}_key` naming
const CONSTRAINT_TABLES: [&str; 6] = ["appuser", "activity", "client", "project", "proposal", "role"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("duplicate value violates unique constraint {constraint}")]
    DuplicateKey { constraint: String },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("constraint {constraint} violated")]
    Constraint { constraint: String },

    #[error("store call exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn duplicate(constraint: &str) -> Self {
        StoreError::DuplicateKey {
            constraint: constraint.to_string(),
        }
    }

    pub fn constraint(constraint: &str) -> Self {
        StoreError::Constraint {
            constraint: constraint.to_string(),
        }
    }

    /// Column named by a `{table}_{column}_key` unique constraint
    pub fn duplicate_field(&self) -> Option<String> {
        let StoreError::DuplicateKey { constraint } = self else {
            return None;
        };
        let column = constraint.strip_suffix("_key").unwrap_or(constraint);
        let column = CONSTRAINT_TABLES
            .iter()
            .find_map(|table| column.strip_prefix(table).and_then(|c| c.strip_prefix('_')))
            .unwrap_or(column);
        Some(column.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return StoreError::NotFound;
        }

        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return StoreError::DuplicateKey { constraint },
                Some(FOREIGN_KEY_VIOLATION) | Some(CHECK_VIOLATION) => {
                    return StoreError::Constraint { constraint }
                }
                _ => {}
            }
        }

        StoreError::Database(err)
    }
}

impl From<ValidationErrors> for StoreError {
    fn from(errors: ValidationErrors) -> Self {
        StoreError::Validation(errors)
    }
}

/// Run a store call under a deadline. A dropped transaction future rolls back.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Store call abandoned after {:?}", deadline);
            Err(StoreError::Timeout(deadline))
        }
    }
}
