//! Parameterized statements for the version guard and join-table reconciliation.

use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::fmt;
use std::hash::Hash;

use crate::model::{AssignmentMember, Timestamp};
use crate::store::error::{StoreError, StoreResult};
use crate::store::update::{plan_reconcile, AssociationPlan, PhaseTracker, UpdatePhase};

/// An owned bind argument; keeps each placeholder paired with its value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i32),
    Text(String),
    OptText(Option<String>),
    Bool(bool),
    Date(NaiveDate),
    TextArray(Vec<String>),
    Json(Option<serde_json::Value>),
}

impl SqlValue {
    pub fn push_bind(self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            SqlValue::Int(v) => qb.push_bind(v),
            SqlValue::Text(v) => qb.push_bind(v),
            SqlValue::OptText(v) => qb.push_bind(v),
            SqlValue::Bool(v) => qb.push_bind(v),
            SqlValue::Date(v) => qb.push_bind(v),
            SqlValue::TextArray(v) => qb.push_bind(v),
            SqlValue::Json(v) => qb.push_bind(v.map(Json)),
        };
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// A join table whose rows are `(owner, member...)`
#[derive(Debug, Clone, Copy)]
pub struct JoinTable {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub member_columns: &'static [&'static str],
}

pub const PROJECT_CLIENTS: JoinTable = JoinTable {
    table: "project_client",
    owner_column: "project_internal_id",
    member_columns: &["client_id"],
};

pub const PROJECT_ASSIGNMENTS: JoinTable = JoinTable {
    table: "assignment",
    owner_column: "project_id",
    member_columns: &["employee_id", "role_id"],
};

pub const TIMESHEET_USERS: JoinTable = JoinTable {
    table: "timesheet_appuser",
    owner_column: "timesheet_id",
    member_columns: &["user_id"],
};

pub const TIMESHEET_PROJECTS: JoinTable = JoinTable {
    table: "timesheet_project",
    owner_column: "timesheet_id",
    member_columns: &["project_id"],
};

pub const TIMESHEET_CLIENTS: JoinTable = JoinTable {
    table: "timesheet_client",
    owner_column: "timesheet_id",
    member_columns: &["client_id"],
};

pub const TIMESHEET_ACTIVITIES: JoinTable = JoinTable {
    table: "timesheet_activity",
    owner_column: "timesheet_id",
    member_columns: &["activity_id"],
};

/// The member side of a join row, read and bound in `member_columns` order
pub trait JoinMember: Clone + Eq + Hash + Send + Sync + Sized {
    fn bind_values(&self) -> Vec<SqlValue>;
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

impl JoinMember for i32 {
    fn bind_values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Int(*self)]
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        row.try_get(0)
    }
}

impl JoinMember for String {
    fn bind_values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.clone())]
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        row.try_get(0)
    }
}

impl JoinMember for AssignmentMember {
    fn bind_values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.employee_id.clone()), SqlValue::Int(self.role_id)]
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(AssignmentMember {
            employee_id: row.try_get(0)?,
            role_id: row.try_get(1)?,
        })
    }
}

/// `SELECT members FROM join WHERE owner = $1`
pub(crate) fn select_members_statement(join: &JoinTable, owner: SqlValue) -> QueryBuilder<'static, Postgres> {
    let mut select = QueryBuilder::<Postgres>::new("SELECT ");
    select
        .push(join.member_columns.join(", "))
        .push(" FROM ")
        .push(join.table)
        .push(" WHERE ")
        .push(join.owner_column)
        .push(" = ");
    owner.push_bind(&mut select);
    select
}

/// `DELETE` of exactly one `(owner, member)` row
pub(crate) fn delete_member_statement<M: JoinMember>(
    join: &JoinTable,
    owner: SqlValue,
    member: &M,
) -> QueryBuilder<'static, Postgres> {
    let mut delete = QueryBuilder::<Postgres>::new("DELETE FROM ");
    delete.push(join.table).push(" WHERE ").push(join.owner_column).push(" = ");
    owner.push_bind(&mut delete);
    for (column, value) in join.member_columns.iter().zip(member.bind_values()) {
        delete.push(" AND ").push(*column).push(" = ");
        value.push_bind(&mut delete);
    }
    delete
}

/// One multi-row `INSERT ... ON CONFLICT DO NOTHING`; `None` when there is nothing to add
pub(crate) fn insert_members_statement<M: JoinMember>(
    join: &JoinTable,
    owner: SqlValue,
    members: &[M],
) -> Option<QueryBuilder<'static, Postgres>> {
    if members.is_empty() {
        return None;
    }

    let mut insert = QueryBuilder::<Postgres>::new("INSERT INTO ");
    insert
        .push(join.table)
        .push(" (")
        .push(join.owner_column)
        .push(", ")
        .push(join.member_columns.join(", "))
        .push(") VALUES ");
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            insert.push(", ");
        }
        insert.push("(");
        owner.clone().push_bind(&mut insert);
        for value in member.bind_values() {
            insert.push(", ");
            value.push_bind(&mut insert);
        }
        insert.push(")");
    }
    insert.push(" ON CONFLICT DO NOTHING");
    Some(insert)
}

/// Bring the rows of `join` owned by `owner` to exactly `desired`.
///
/// Stale rows are deleted one by one; new rows go in a single
/// `INSERT ... ON CONFLICT DO NOTHING` so a concurrent duplicate is a no-op.
pub async fn reconcile_members<M: JoinMember>(
    conn: &mut PgConnection,
    join: &JoinTable,
    owner: SqlValue,
    desired: &[M],
) -> StoreResult<AssociationPlan<M>> {
    let rows = select_members_statement(join, owner.clone())
        .build()
        .fetch_all(&mut *conn)
        .await?;
    let current = rows
        .iter()
        .map(M::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let plan = plan_reconcile(&current, desired);

    for member in &plan.to_delete {
        delete_member_statement(join, owner.clone(), member)
            .build()
            .execute(&mut *conn)
            .await?;
    }
    if let Some(mut insert) = insert_members_statement(join, owner, &plan.to_insert) {
        insert.build().execute(&mut *conn).await?;
    }

    log::debug!(
        "{}: {} removed, {} added",
        join.table,
        plan.to_delete.len(),
        plan.to_insert.len()
    );
    Ok(plan)
}

/// `UPDATE table SET fields..., version = version + 1, updated_at = NOW()
/// WHERE key AND version = expected RETURNING version, updated_at`
pub(crate) fn version_guard_statement(
    table: &str,
    key_column: &str,
    key: SqlValue,
    expected_version: i32,
    fields: Vec<(&'static str, SqlValue)>,
) -> QueryBuilder<'static, Postgres> {
    let mut update = QueryBuilder::<Postgres>::new("UPDATE ");
    update.push(table).push(" SET ");
    for (column, value) in fields {
        update.push(column).push(" = ");
        value.push_bind(&mut update);
        update.push(", ");
    }
    update
        .push("version = version + 1, updated_at = NOW() WHERE ")
        .push(key_column)
        .push(" = ");
    key.push_bind(&mut update);
    update.push(" AND version = ");
    update.push_bind(expected_version);
    update.push(" RETURNING version, updated_at");
    update
}

/// New version and timestamp returned by a successful version guard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionStamp {
    pub version: i32,
    pub updated_at: Timestamp,
}

/// One version-guarded update: guard, reconcile, then commit or roll back as a unit
pub struct UpdateTransaction {
    tx: Transaction<'static, Postgres>,
    tracker: PhaseTracker,
}

impl UpdateTransaction {
    pub async fn begin(pool: &PgPool, entity: &'static str, key: impl fmt::Display) -> StoreResult<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            tracker: PhaseTracker::start(entity, key),
        })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Run the version guard; zero matching rows is an edit conflict
    pub async fn guard_version(
        &mut self,
        table: &str,
        key_column: &str,
        key: SqlValue,
        expected_version: i32,
        fields: Vec<(&'static str, SqlValue)>,
    ) -> StoreResult<VersionStamp> {
        let mut update = version_guard_statement(table, key_column, key, expected_version, fields);
        let row = update.build().fetch_optional(&mut *self.tx).await?;
        let Some(row) = row else {
            return Err(StoreError::EditConflict);
        };

        self.tracker.advance(UpdatePhase::VersionChecked);
        Ok(VersionStamp {
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// `None` leaves the association untouched; `Some(&[])` clears it
    pub async fn reconcile<M: JoinMember>(
        &mut self,
        join: &JoinTable,
        owner: SqlValue,
        desired: Option<&[M]>,
    ) -> StoreResult<()> {
        if let Some(desired) = desired {
            reconcile_members(&mut self.tx, join, owner, desired).await?;
        }
        Ok(())
    }

    /// Commit on success, roll back on error; the error kind is returned unchanged
    pub async fn finish<T>(self, result: StoreResult<T>) -> StoreResult<T> {
        let UpdateTransaction { tx, mut tracker } = self;
        match result {
            Ok(value) => {
                if tracker.phase() == UpdatePhase::VersionChecked {
                    tracker.advance(UpdatePhase::AssociationsReconciled);
                }
                let committed = tx.commit().await.map_err(StoreError::from);
                tracker.finish(committed.map(|_| value))
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Rollback failed: {}", rollback_err);
                }
                tracker.finish(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_guard_matches_key_and_expected_version() {
        let update = version_guard_statement(
            "project",
            "internal_id",
            SqlValue::Int(7),
            1,
            vec![("name", SqlValue::from("North")), ("status", SqlValue::from("active"))],
        );
        assert_eq!(
            update.sql(),
            "UPDATE project SET name = $1, status = $2, version = version + 1, updated_at = NOW() \
             WHERE internal_id = $3 AND version = $4 RETURNING version, updated_at"
        );
    }

    #[test]
    fn test_version_guard_without_fields_only_bumps() {
        let update = version_guard_statement("timesheet", "id", SqlValue::from("01HTS"), 3, Vec::new());
        assert_eq!(
            update.sql(),
            "UPDATE timesheet SET version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 RETURNING version, updated_at"
        );
    }

    #[test]
    fn test_select_members_reads_member_columns_in_order() {
        let select = select_members_statement(&PROJECT_ASSIGNMENTS, SqlValue::Int(24001));
        assert_eq!(select.sql(), "SELECT employee_id, role_id FROM assignment WHERE project_id = $1");
    }

    #[test]
    fn test_delete_member_pins_every_column() {
        let member = AssignmentMember::new("abcd1234".to_string(), 2);
        let delete = delete_member_statement(&PROJECT_ASSIGNMENTS, SqlValue::Int(24001), &member);
        assert_eq!(
            delete.sql(),
            "DELETE FROM assignment WHERE project_id = $1 AND employee_id = $2 AND role_id = $3"
        );
    }

    #[test]
    fn test_insert_members_ignores_existing_pairs() {
        let insert = insert_members_statement(&PROJECT_CLIENTS, SqlValue::Int(7), &[1, 2]).unwrap();
        assert_eq!(
            insert.sql(),
            "INSERT INTO project_client (project_internal_id, client_id) VALUES ($1, $2), ($3, $4) \
             ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_insert_members_skips_empty_set() {
        assert!(insert_members_statement::<i32>(&TIMESHEET_CLIENTS, SqlValue::from("01HTS"), &[]).is_none());
    }
}
