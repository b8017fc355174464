use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use super::tx::{SqlValue, UpdateTransaction};
use super::{like_pattern, page_metadata, push_paging, PostgresStore, LIKE_ESCAPE};
use crate::model::{Assignment, NewUser, Page, SerialId, User, UserQuery};
use crate::store::error::StoreResult;
use crate::store::traits::{AssignmentStore, UserStore};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password_hash, activated, version, created_at, updated_at";

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment, sqlx::Error> {
    Ok(Assignment {
        project_id: row.try_get("project_id")?,
        employee_id: row.try_get("employee_id")?,
        role_id: row.try_get("role_id")?,
    })
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.timed(async {
            let row = sqlx::query(&format!(
                "INSERT INTO appuser (id, email, first_name, last_name, password_hash) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {}",
                USER_COLUMNS
            ))
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await?;

            Ok(user_from_row(&row)?)
        })
        .await
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        self.timed(async {
            let row = sqlx::query(&format!("SELECT {} FROM appuser WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

            Ok(row.as_ref().map(user_from_row).transpose()?)
        })
        .await
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>> {
        let filters = query.filters();
        self.timed(async {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) OVER() AS total, ");
            qb.push(USER_COLUMNS).push(" FROM appuser");

            if query.has_filters() {
                // A user matches when any supplied filter matches
                qb.push(" WHERE (FALSE");
                for (column, value) in [
                    ("email", &query.email),
                    ("first_name", &query.first_name),
                    ("last_name", &query.last_name),
                ] {
                    if let Some(value) = value {
                        qb.push(" OR ").push(column)
                            .push(" ILIKE ")
                            .push_bind(like_pattern(value))
                            .push(LIKE_ESCAPE);
                    }
                }
                qb.push(")");
            }
            push_paging(&mut qb, &filters, "id");

            let rows = qb.build().fetch_all(&self.pool).await?;
            let total = rows.first().map(|r| r.try_get::<i64, _>("total")).transpose()?;
            let items = rows.iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;

            Ok(Page {
                items,
                metadata: page_metadata(total, &filters),
            })
        })
        .await
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        self.timed(async {
            let mut utx = UpdateTransaction::begin(&self.pool, "user", &user.id).await?;
            let result = async {
                utx.guard_version(
                    "appuser",
                    "id",
                    SqlValue::Text(user.id.clone()),
                    user.version,
                    vec![
                        ("email", SqlValue::Text(user.email.clone())),
                        ("first_name", SqlValue::Text(user.first_name.clone())),
                        ("last_name", SqlValue::Text(user.last_name.clone())),
                        ("password_hash", SqlValue::Text(user.password_hash.clone())),
                        ("activated", SqlValue::Bool(user.activated)),
                    ],
                )
                .await?;

                let row = sqlx::query(&format!("SELECT {} FROM appuser WHERE id = $1", USER_COLUMNS))
                    .bind(&user.id)
                    .fetch_one(utx.conn())
                    .await?;
                Ok(user_from_row(&row)?)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM appuser WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

#[async_trait::async_trait]
impl AssignmentStore for PostgresStore {
    async fn assignments_for_project(&self, project_id: SerialId) -> StoreResult<Vec<Assignment>> {
        self.timed(async {
            let rows = sqlx::query(
                "SELECT project_id, employee_id, role_id FROM assignment \
                 WHERE project_id = $1 ORDER BY employee_id, role_id",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.iter().map(assignment_from_row).collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn assignments_for_employee(&self, employee_id: &str) -> StoreResult<Vec<Assignment>> {
        self.timed(async {
            let rows = sqlx::query(
                "SELECT project_id, employee_id, role_id FROM assignment \
                 WHERE employee_id = $1 ORDER BY project_id, role_id",
            )
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.iter().map(assignment_from_row).collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
