use sqlx::postgres::PgRow;
use sqlx::Row;

use super::tx::{SqlValue, UpdateTransaction};
use super::PostgresStore;
use crate::model::Proposal;
use crate::store::error::StoreResult;
use crate::store::traits::ProposalStore;

const PROPOSAL_COLUMNS: &str = "internal_id, proposal_id, version, created_at, updated_at";

fn proposal_from_row(row: &PgRow) -> Result<Proposal, sqlx::Error> {
    Ok(Proposal {
        internal_id: row.try_get("internal_id")?,
        proposal_id: row.try_get("proposal_id")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait::async_trait]
impl ProposalStore for PostgresStore {
    async fn insert_proposal(&self, proposal_id: &str) -> StoreResult<Proposal> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "INSERT INTO proposal (proposal_id) VALUES ($1) RETURNING {}",
                PROPOSAL_COLUMNS
            ))
            .bind(proposal_id)
            .fetch_one(&self.pool)
            .await?;

            Ok(proposal_from_row(&row)?)
        })
        .await
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "SELECT {} FROM proposal WHERE proposal_id = $1",
                PROPOSAL_COLUMNS
            ))
            .bind(proposal_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.as_ref().map(proposal_from_row).transpose()?)
        })
        .await
    }

    async fn update_proposal(&self, proposal: &Proposal) -> StoreResult<Proposal> {
        self.timed(async {
            let mut utx = UpdateTransaction::begin(&self.pool, "proposal", proposal.internal_id).await?;
            let result = async {
                utx.guard_version(
                    "proposal",
                    "internal_id",
                    SqlValue::Int(proposal.internal_id),
                    proposal.version,
                    vec![("proposal_id", SqlValue::Text(proposal.proposal_id.clone()))],
                )
                .await?;

                let row = sqlx::query(&format!(
                    "SELECT {} FROM proposal WHERE internal_id = $1",
                    PROPOSAL_COLUMNS
                ))
                .bind(proposal.internal_id)
                .fetch_one(utx.conn())
                .await?;
                Ok(proposal_from_row(&row)?)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_proposal(&self, proposal_id: &str) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM proposal WHERE proposal_id = $1")
                .bind(proposal_id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
