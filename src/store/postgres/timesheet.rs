use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};

use super::tx::{
    reconcile_members, SqlValue, UpdateTransaction, TIMESHEET_ACTIVITIES, TIMESHEET_CLIENTS,
    TIMESHEET_PROJECTS, TIMESHEET_USERS,
};
use super::{like_pattern, page_metadata, push_paging, PostgresStore, LIKE_ESCAPE};
use crate::model::{
    parse_date, JoinedTimesheet, NamedRef, NewTimesheet, Page, Timesheet, TimesheetProject, TimesheetQuery,
    TimesheetStatus, TimesheetUser,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::TimesheetStore;

const TIMESHEET_SELECT: &str = "SELECT t.id, t.work_date, t.work_minutes, t.description, t.status, t.version, \
     t.created_at, t.updated_at, tu.user_id, tp.project_id, tc.client_id, ta.activity_id \
     FROM timesheet t \
     LEFT JOIN timesheet_appuser tu ON tu.timesheet_id = t.id \
     LEFT JOIN timesheet_project tp ON tp.timesheet_id = t.id \
     LEFT JOIN timesheet_client tc ON tc.timesheet_id = t.id \
     LEFT JOIN timesheet_activity ta ON ta.timesheet_id = t.id";

const JOINED_SELECT: &str = "SELECT count(*) OVER() AS total, t.id, t.work_date, t.work_minutes, t.description, \
     t.status, t.version, t.created_at, t.updated_at, \
     u.id AS user_id, u.email, u.first_name, u.last_name, \
     p.project_id AS project_id, p.name AS project_name, \
     c.id AS client_id, c.name AS client_name, \
     a.id AS activity_id, a.name AS activity_name \
     FROM timesheet t \
     LEFT JOIN timesheet_appuser tu ON tu.timesheet_id = t.id \
     LEFT JOIN appuser u ON u.id = tu.user_id \
     LEFT JOIN timesheet_project tp ON tp.timesheet_id = t.id \
     LEFT JOIN project p ON p.project_id = tp.project_id \
     LEFT JOIN timesheet_client tc ON tc.timesheet_id = t.id \
     LEFT JOIN client c ON c.id = tc.client_id \
     LEFT JOIN timesheet_activity ta ON ta.timesheet_id = t.id \
     LEFT JOIN activity a ON a.id = ta.activity_id";

fn status_from_row(row: &PgRow) -> Result<TimesheetStatus, sqlx::Error> {
    let status: String = row.try_get("status")?;
    status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
}

/// Links whose target row was deleted read back as empty values
fn timesheet_from_row(row: &PgRow) -> Result<Timesheet, sqlx::Error> {
    Ok(Timesheet {
        id: row.try_get("id")?,
        user_id: row.try_get::<Option<String>, _>("user_id")?.unwrap_or_default(),
        project_id: row.try_get::<Option<i32>, _>("project_id")?.unwrap_or_default(),
        client_id: row.try_get::<Option<i32>, _>("client_id")?.unwrap_or_default(),
        activity_id: row.try_get::<Option<i32>, _>("activity_id")?.unwrap_or_default(),
        work_date: row.try_get("work_date")?,
        work_minutes: row.try_get("work_minutes")?,
        description: row.try_get("description")?,
        status: status_from_row(row)?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn joined_from_row(row: &PgRow) -> Result<JoinedTimesheet, sqlx::Error> {
    let user = match row.try_get::<Option<String>, _>("user_id")? {
        Some(id) => Some(TimesheetUser {
            id,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
        }),
        None => None,
    };
    let project = match row.try_get::<Option<i32>, _>("project_id")? {
        Some(project_id) => Some(TimesheetProject {
            project_id,
            name: row.try_get("project_name")?,
        }),
        None => None,
    };
    let named = |id_column: &str, name_column: &str| -> Result<Option<NamedRef>, sqlx::Error> {
        match row.try_get::<Option<i32>, _>(id_column)? {
            Some(id) => Ok(Some(NamedRef {
                id,
                name: row.try_get(name_column)?,
            })),
            None => Ok(None),
        }
    };

    Ok(JoinedTimesheet {
        id: row.try_get("id")?,
        user,
        project,
        client: named("client_id", "client_name")?,
        activity: named("activity_id", "activity_name")?,
        work_date: row.try_get("work_date")?,
        work_minutes: row.try_get("work_minutes")?,
        description: row.try_get("description")?,
        status: status_from_row(row)?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn fetch_timesheet(conn: &mut PgConnection, id: &str) -> StoreResult<Option<Timesheet>> {
    let row = sqlx::query(&format!("{} WHERE t.id = $1", TIMESHEET_SELECT))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(timesheet_from_row).transpose()?)
}

fn push_timesheet_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TimesheetQuery) {
    // Every supplied filter must match
    qb.push(" WHERE TRUE");
    if let Some(user_id) = &query.user_id {
        qb.push(" AND u.id = ").push_bind(user_id.clone());
    }
    for (column, value) in [
        ("u.email", &query.email),
        ("u.first_name", &query.first_name),
        ("u.last_name", &query.last_name),
        ("p.name", &query.project_name),
        ("a.name", &query.activity_name),
    ] {
        if let Some(value) = value {
            qb.push(" AND ").push(column)
                .push(" ILIKE ")
                .push_bind(like_pattern(value))
                .push(LIKE_ESCAPE);
        }
    }
    if let Some(project_id) = query.project_id {
        qb.push(" AND p.project_id = ").push_bind(project_id);
    }
    if let Some(activity_id) = query.activity_id {
        qb.push(" AND a.id = ").push_bind(activity_id);
    }
    for (op, value) in [
        (" = ", &query.work_date),
        (" >= ", &query.from_date),
        (" <= ", &query.to_date),
    ] {
        if let Some(date) = value.as_deref().and_then(parse_date) {
            qb.push(" AND t.work_date").push(op).push_bind(date);
        }
    }
}

#[async_trait::async_trait]
impl TimesheetStore for PostgresStore {
    async fn insert_timesheet(&self, timesheet: NewTimesheet) -> StoreResult<Timesheet> {
        self.timed(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO timesheet (id, work_date, work_minutes, description) VALUES ($1, $2, $3, $4)",
            )
            .bind(&timesheet.id)
            .bind(timesheet.work_date)
            .bind(timesheet.work_minutes)
            .bind(&timesheet.description)
            .execute(&mut *tx)
            .await?;

            let owner = SqlValue::Text(timesheet.id.clone());
            reconcile_members(&mut tx, &TIMESHEET_USERS, owner.clone(), &[timesheet.user_id.clone()]).await?;
            reconcile_members(&mut tx, &TIMESHEET_PROJECTS, owner.clone(), &[timesheet.project_id]).await?;
            reconcile_members(&mut tx, &TIMESHEET_CLIENTS, owner.clone(), &[timesheet.client_id]).await?;
            reconcile_members(&mut tx, &TIMESHEET_ACTIVITIES, owner, &[timesheet.activity_id]).await?;

            let created = fetch_timesheet(&mut tx, &timesheet.id)
                .await?
                .ok_or(StoreError::NotFound)?;
            tx.commit().await?;
            Ok(created)
        })
        .await
    }

    async fn get_timesheet(&self, id: &str) -> StoreResult<Option<Timesheet>> {
        self.timed(async {
            let mut conn = self.pool.acquire().await?;
            fetch_timesheet(&mut conn, id).await
        })
        .await
    }

    async fn list_timesheets(&self, query: &TimesheetQuery) -> StoreResult<Page<JoinedTimesheet>> {
        let filters = query.filters();
        self.timed(async {
            let mut qb = QueryBuilder::<Postgres>::new(JOINED_SELECT);
            push_timesheet_filters(&mut qb, query);
            push_paging(&mut qb, &filters, "id");

            let rows = qb.build().fetch_all(&self.pool).await?;
            let total = rows.first().map(|r| r.try_get::<i64, _>("total")).transpose()?;
            let items = rows.iter().map(joined_from_row).collect::<Result<Vec<_>, _>>()?;

            Ok(Page {
                items,
                metadata: page_metadata(total, &filters),
            })
        })
        .await
    }

    async fn daily_minutes(&self, user_id: &str, work_date: NaiveDate, excluding: Option<&str>) -> StoreResult<i32> {
        self.timed(async {
            let row = sqlx::query(
                "SELECT COALESCE(SUM(t.work_minutes), 0)::int4 AS total \
                 FROM timesheet t JOIN timesheet_appuser tu ON tu.timesheet_id = t.id \
                 WHERE tu.user_id = $1 AND t.work_date = $2 AND ($3::text IS NULL OR t.id <> $3)",
            )
            .bind(user_id)
            .bind(work_date)
            .bind(excluding)
            .fetch_one(&self.pool)
            .await?;

            Ok(row.try_get::<i32, _>("total")?)
        })
        .await
    }

    async fn update_timesheet(&self, timesheet: &Timesheet) -> StoreResult<Timesheet> {
        self.timed(async {
            let mut utx = UpdateTransaction::begin(&self.pool, "timesheet", &timesheet.id).await?;
            let result = async {
                utx.guard_version(
                    "timesheet",
                    "id",
                    SqlValue::Text(timesheet.id.clone()),
                    timesheet.version,
                    vec![
                        ("work_date", SqlValue::Date(timesheet.work_date)),
                        ("work_minutes", SqlValue::Int(timesheet.work_minutes)),
                        ("description", SqlValue::Text(timesheet.description.clone())),
                        ("status", SqlValue::Text(timesheet.status.to_string())),
                    ],
                )
                .await?;

                // Each link is a single-member set
                let owner = SqlValue::Text(timesheet.id.clone());
                utx.reconcile(&TIMESHEET_USERS, owner.clone(), Some(&[timesheet.user_id.clone()][..]))
                    .await?;
                utx.reconcile(&TIMESHEET_PROJECTS, owner.clone(), Some(&[timesheet.project_id][..]))
                    .await?;
                utx.reconcile(&TIMESHEET_CLIENTS, owner.clone(), Some(&[timesheet.client_id][..]))
                    .await?;
                utx.reconcile(&TIMESHEET_ACTIVITIES, owner, Some(&[timesheet.activity_id][..]))
                    .await?;

                fetch_timesheet(utx.conn(), &timesheet.id)
                    .await?
                    .ok_or(StoreError::NotFound)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_timesheet(&self, id: &str) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM timesheet WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
