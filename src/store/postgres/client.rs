use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use super::tx::{SqlValue, UpdateTransaction};
use super::{like_pattern, page_metadata, push_paging, PostgresStore, LIKE_ESCAPE};
use crate::model::{Client, NameQuery, NewClient, Page, SerialId};
use crate::store::error::StoreResult;
use crate::store::traits::ClientStore;

const CLIENT_COLUMNS: &str = "id, name, address, logo_url, note, version, created_at, updated_at";

fn client_from_row(row: &PgRow) -> Result<Client, sqlx::Error> {
    Ok(Client {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        logo_url: row.try_get("logo_url")?,
        note: row.try_get("note")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait::async_trait]
impl ClientStore for PostgresStore {
    async fn insert_client(&self, client: NewClient) -> StoreResult<Client> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "INSERT INTO client (name, address, logo_url, note) VALUES ($1, $2, $3, $4) RETURNING {}",
                CLIENT_COLUMNS
            ))
            .bind(&client.name)
            .bind(&client.address)
            .bind(&client.logo_url)
            .bind(&client.note)
            .fetch_one(&self.pool)
            .await?;

            Ok(client_from_row(&row)?)
        })
        .await
    }

    async fn get_client(&self, id: SerialId) -> StoreResult<Option<Client>> {
        self.timed(async {
            let row = sqlx::query(&format!("SELECT {} FROM client WHERE id = $1", CLIENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

            Ok(row.as_ref().map(client_from_row).transpose()?)
        })
        .await
    }

    async fn list_clients(&self, query: &NameQuery) -> StoreResult<Page<Client>> {
        let filters = query.filters();
        self.timed(async {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) OVER() AS total, ");
            qb.push(CLIENT_COLUMNS).push(" FROM client WHERE 1 = 1");
            if let Some(name) = &query.name {
                qb.push(" AND name ILIKE ").push_bind(like_pattern(name)).push(LIKE_ESCAPE);
            }
            push_paging(&mut qb, &filters, "id");

            let rows = qb.build().fetch_all(&self.pool).await?;
            let total = rows.first().map(|r| r.try_get::<i64, _>("total")).transpose()?;
            let items = rows.iter().map(client_from_row).collect::<Result<Vec<_>, _>>()?;

            Ok(Page {
                items,
                metadata: page_metadata(total, &filters),
            })
        })
        .await
    }

    async fn find_clients_by_names(&self, names: &[String]) -> StoreResult<Vec<Client>> {
        self.timed(async {
            let rows = sqlx::query(&format!(
                "SELECT {} FROM client WHERE name = ANY($1) ORDER BY id",
                CLIENT_COLUMNS
            ))
            .bind(names)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.iter().map(client_from_row).collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn update_client(&self, client: &Client) -> StoreResult<Client> {
        self.timed(async {
            let mut utx = UpdateTransaction::begin(&self.pool, "client", client.id).await?;
            let result = async {
                utx.guard_version(
                    "client",
                    "id",
                    SqlValue::Int(client.id),
                    client.version,
                    vec![
                        ("name", SqlValue::Text(client.name.clone())),
                        ("address", SqlValue::OptText(client.address.clone())),
                        ("logo_url", SqlValue::OptText(client.logo_url.clone())),
                        ("note", SqlValue::OptText(client.note.clone())),
                    ],
                )
                .await?;

                let row = sqlx::query(&format!("SELECT {} FROM client WHERE id = $1", CLIENT_COLUMNS))
                    .bind(client.id)
                    .fetch_one(utx.conn())
                    .await?;
                Ok(client_from_row(&row)?)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_client(&self, id: SerialId) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM client WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
