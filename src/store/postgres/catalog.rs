use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use super::tx::{SqlValue, UpdateTransaction};
use super::{like_pattern, page_metadata, push_paging, PostgresStore, LIKE_ESCAPE};
use crate::model::{Catalog, CatalogEntry, NameQuery, Page, SerialId};
use crate::store::error::StoreResult;
use crate::store::traits::CatalogStore;

const ENTRY_COLUMNS: &str = "id, name, version, created_at, updated_at";

fn entry_from_row(row: &PgRow) -> Result<CatalogEntry, sqlx::Error> {
    Ok(CatalogEntry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_entry(&self, catalog: Catalog, name: &str) -> StoreResult<CatalogEntry> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "INSERT INTO {} (name) VALUES ($1) RETURNING {}",
                catalog.table(),
                ENTRY_COLUMNS
            ))
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

            Ok(entry_from_row(&row)?)
        })
        .await
    }

    async fn get_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<Option<CatalogEntry>> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "SELECT {} FROM {} WHERE id = $1",
                ENTRY_COLUMNS,
                catalog.table()
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.as_ref().map(entry_from_row).transpose()?)
        })
        .await
    }

    async fn list_entries(&self, catalog: Catalog, query: &NameQuery) -> StoreResult<Page<CatalogEntry>> {
        let filters = query.filters();
        self.timed(async {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) OVER() AS total, ");
            qb.push(ENTRY_COLUMNS)
                .push(" FROM ")
                .push(catalog.table())
                .push(" WHERE 1 = 1");
            if let Some(name) = &query.name {
                qb.push(" AND name ILIKE ").push_bind(like_pattern(name)).push(LIKE_ESCAPE);
            }
            push_paging(&mut qb, &filters, "id");

            let rows = qb.build().fetch_all(&self.pool).await?;
            let total = rows.first().map(|r| r.try_get::<i64, _>("total")).transpose()?;
            let items = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;

            Ok(Page {
                items,
                metadata: page_metadata(total, &filters),
            })
        })
        .await
    }

    async fn update_entry(&self, catalog: Catalog, entry: &CatalogEntry) -> StoreResult<CatalogEntry> {
        self.timed(async {
            let mut utx = UpdateTransaction::begin(&self.pool, catalog.table(), entry.id).await?;
            let result = async {
                utx.guard_version(
                    catalog.table(),
                    "id",
                    SqlValue::Int(entry.id),
                    entry.version,
                    vec![("name", SqlValue::Text(entry.name.clone()))],
                )
                .await?;

                let row = sqlx::query(&format!(
                    "SELECT {} FROM {} WHERE id = $1",
                    ENTRY_COLUMNS,
                    catalog.table()
                ))
                .bind(entry.id)
                .fetch_one(utx.conn())
                .await?;
                Ok(entry_from_row(&row)?)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", catalog.table()))
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
