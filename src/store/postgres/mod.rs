mod catalog;
mod client;
mod project;
mod proposal;
mod timesheet;
pub mod tx;
mod user;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use std::future::Future;
use std::time::Duration;

use crate::model::{Filters, Metadata};
use crate::store::error::{with_deadline, StoreResult};
use crate::store::traits::Store;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    deadline: Duration,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_options(database_url, DEFAULT_MAX_CONNECTIONS, DEFAULT_DEADLINE).await
    }

    pub async fn with_options(database_url: &str, max_connections: u32, deadline: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(deadline)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool, deadline })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Every store call runs under the configured deadline
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        with_deadline(self.deadline, fut).await
    }
}

/// Append `ORDER BY`, the key tie-breaker and `LIMIT`/`OFFSET` for a safelisted sort
pub(crate) fn push_paging(qb: &mut QueryBuilder<'_, Postgres>, filters: &Filters, tie_breaker: &str) {
    qb.push(" ORDER BY ")
        .push(filters.sort_column())
        .push(" ")
        .push(filters.sort_direction().as_sql())
        .push(", ")
        .push(tie_breaker)
        .push(" ASC");
    if let Some(limit) = filters.limit() {
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(filters.offset());
    }
}

/// Paging metadata from the `count(*) OVER()` column of the first row
pub(crate) fn page_metadata(total: Option<i64>, filters: &Filters) -> Metadata {
    Metadata::calculate(total.unwrap_or(0).max(0) as u64, filters.page, filters.page_size)
}

/// Follows every `ILIKE` built from [`like_pattern`]
pub(crate) const LIKE_ESCAPE: &str = " ESCAPE '\\'";

/// `%value%` for ILIKE filters, with the value's own wildcards taken literally
pub(crate) fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Store for PostgresStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("acme"), "%acme%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("site_visit"), "%site\\_visit%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_paging_binds_limit_after_sort() {
        let filters = Filters::new(Some(2), Some(10), Some("-name".to_string()), &["id", "name"]);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM client WHERE name ILIKE ");
        qb.push_bind(like_pattern("ac")).push(LIKE_ESCAPE);
        push_paging(&mut qb, &filters, "id");
        assert_eq!(
            qb.sql(),
            "SELECT id FROM client WHERE name ILIKE $1 ESCAPE '\\' ORDER BY name DESC, id ASC LIMIT $2 OFFSET $3"
        );
    }

    #[test]
    fn test_unlimited_page_has_no_limit() {
        let filters = Filters::new(None, None, None, &["id", "name"]);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM role");
        push_paging(&mut qb, &filters, "id");
        assert_eq!(qb.sql(), "SELECT id FROM role ORDER BY id ASC, id ASC");
    }

    #[test]
    fn test_missing_window_count_gives_empty_metadata() {
        let filters = Filters::new(Some(5), Some(1), None, &["id"]);
        assert_eq!(page_metadata(None, &filters), Metadata::default());
        assert_eq!(page_metadata(Some(2), &Filters::new(Some(2), Some(1), None, &["id"])).last_page, 2);
    }
}
