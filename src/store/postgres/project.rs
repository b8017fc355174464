use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use std::collections::HashMap;

use super::tx::{reconcile_members, SqlValue, UpdateTransaction, PROJECT_ASSIGNMENTS, PROJECT_CLIENTS};
use super::{like_pattern, page_metadata, push_paging, PostgresStore, LIKE_ESCAPE};
use crate::model::{
    Feature, NewProject, Page, Project, ProjectAssignment, ProjectChanges, ProjectClient, ProjectFields,
    ProjectQuery, SerialId,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::ProjectStore;

const PROJECT_COLUMNS: &str =
    "internal_id, project_id, proposal_id, name, status, feature, note, images, version, created_at, updated_at";

fn project_from_row(row: &PgRow) -> Result<Project, sqlx::Error> {
    let feature: Option<Json<Feature>> = row.try_get("feature")?;
    Ok(Project {
        internal_id: row.try_get("internal_id")?,
        fields: ProjectFields {
            project_id: row.try_get("project_id")?,
            proposal_id: row.try_get("proposal_id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            feature: feature.map(|f| f.0),
            note: row.try_get("note")?,
            images: row.try_get("images")?,
        },
        clients: Vec::new(),
        assignments: Vec::new(),
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Column values written by the version guard
fn field_values(fields: &ProjectFields) -> StoreResult<Vec<(&'static str, SqlValue)>> {
    let feature = fields
        .feature
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Unexpected(e.into()))?;

    Ok(vec![
        ("project_id", SqlValue::Int(fields.project_id)),
        ("proposal_id", SqlValue::Text(fields.proposal_id.clone())),
        ("name", SqlValue::Text(fields.name.clone())),
        ("status", SqlValue::Text(fields.status.clone())),
        ("feature", SqlValue::Json(feature)),
        ("note", SqlValue::OptText(fields.note.clone())),
        ("images", SqlValue::TextArray(fields.images.clone())),
    ])
}

/// Load clients and assignments for already-fetched project rows
async fn attach_associations(conn: &mut PgConnection, projects: &mut [Project]) -> StoreResult<()> {
    if projects.is_empty() {
        return Ok(());
    }
    let internal_ids: Vec<SerialId> = projects.iter().map(|p| p.internal_id).collect();
    let project_ids: Vec<SerialId> = projects.iter().map(|p| p.fields.project_id).collect();

    let client_rows = sqlx::query(
        "SELECT pc.project_internal_id, c.id, c.name, c.address, c.logo_url, c.note \
         FROM project_client pc JOIN client c ON c.id = pc.client_id \
         WHERE pc.project_internal_id = ANY($1) ORDER BY c.id",
    )
    .bind(&internal_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut clients: HashMap<SerialId, Vec<ProjectClient>> = HashMap::new();
    for row in &client_rows {
        clients
            .entry(row.try_get("project_internal_id")?)
            .or_default()
            .push(ProjectClient {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                address: row.try_get("address")?,
                logo_url: row.try_get("logo_url")?,
                note: row.try_get("note")?,
            });
    }

    let assignment_rows = sqlx::query(
        "SELECT a.project_id, a.employee_id, u.email AS employee_email, a.role_id, r.name AS role_name \
         FROM assignment a \
         JOIN appuser u ON u.id = a.employee_id \
         JOIN role r ON r.id = a.role_id \
         WHERE a.project_id = ANY($1) ORDER BY a.employee_id, a.role_id",
    )
    .bind(&project_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut assignments: HashMap<SerialId, Vec<ProjectAssignment>> = HashMap::new();
    for row in &assignment_rows {
        assignments
            .entry(row.try_get("project_id")?)
            .or_default()
            .push(ProjectAssignment {
                employee_id: row.try_get("employee_id")?,
                employee_email: row.try_get("employee_email")?,
                role_id: row.try_get("role_id")?,
                role_name: row.try_get("role_name")?,
            });
    }

    for project in projects.iter_mut() {
        project.clients = clients.remove(&project.internal_id).unwrap_or_default();
        project.assignments = assignments.remove(&project.fields.project_id).unwrap_or_default();
    }
    Ok(())
}

async fn fetch_project(conn: &mut PgConnection, key_column: &str, key: SqlValue) -> StoreResult<Option<Project>> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    qb.push(PROJECT_COLUMNS)
        .push(" FROM project WHERE ")
        .push(key_column)
        .push(" = ");
    key.push_bind(&mut qb);

    let row = qb.build().fetch_optional(&mut *conn).await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut projects = [project_from_row(&row)?];
    attach_associations(conn, &mut projects).await?;
    let [project] = projects;
    Ok(Some(project))
}

fn push_project_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProjectQuery) {
    if !query.has_filters() {
        return;
    }

    // A project matches when any supplied filter matches
    qb.push(" WHERE (FALSE");
    for (column, value) in [
        ("p.name", &query.name),
        ("p.status", &query.status),
        ("p.project_id::text", &query.project_id),
        ("p.proposal_id", &query.proposal_id),
        ("p.feature->'properties'->>'full_address'", &query.full_address),
    ] {
        if let Some(value) = value {
            qb.push(" OR ").push(column)
                .push(" ILIKE ")
                .push_bind(like_pattern(value))
                .push(LIKE_ESCAPE);
        }
    }
    if let Some(client_name) = &query.client_name {
        qb.push(
            " OR EXISTS (SELECT 1 FROM project_client pc JOIN client c ON c.id = pc.client_id \
             WHERE pc.project_internal_id = p.internal_id AND c.name ILIKE ",
        )
        .push_bind(like_pattern(client_name))
        .push(LIKE_ESCAPE)
        .push(")");
    }
    if let Some(bbox) = query.bounding_box() {
        qb.push(" OR (p.feature IS NOT NULL AND (p.feature->'geometry'->'coordinates'->>0)::float8 BETWEEN ")
            .push_bind(bbox.min_lng)
            .push(" AND ")
            .push_bind(bbox.max_lng)
            .push(" AND (p.feature->'geometry'->'coordinates'->>1)::float8 BETWEEN ")
            .push_bind(bbox.min_lat)
            .push(" AND ")
            .push_bind(bbox.max_lat)
            .push(")");
    }
    qb.push(")");
}

#[async_trait::async_trait]
impl ProjectStore for PostgresStore {
    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        self.timed(async {
            let values = field_values(&project.fields)?;
            let mut tx = self.pool.begin().await?;

            let mut insert = QueryBuilder::<Postgres>::new("INSERT INTO project (");
            insert.push(values.iter().map(|(column, _)| *column).collect::<Vec<_>>().join(", "));
            insert.push(") VALUES (");
            for (i, (_, value)) in values.into_iter().enumerate() {
                if i > 0 {
                    insert.push(", ");
                }
                value.push_bind(&mut insert);
            }
            insert.push(") RETURNING internal_id");
            let row = insert.build().fetch_one(&mut *tx).await?;
            let internal_id: SerialId = row.try_get("internal_id")?;

            reconcile_members(&mut tx, &PROJECT_CLIENTS, SqlValue::Int(internal_id), &project.client_ids).await?;
            reconcile_members(
                &mut tx,
                &PROJECT_ASSIGNMENTS,
                SqlValue::Int(project.fields.project_id),
                &project.assignments,
            )
            .await?;

            let created = fetch_project(&mut tx, "internal_id", SqlValue::Int(internal_id))
                .await?
                .ok_or(StoreError::NotFound)?;
            tx.commit().await?;

            log::debug!("Inserted project {} ({})", created.fields.project_id, internal_id);
            Ok(created)
        })
        .await
    }

    async fn get_project(&self, project_id: SerialId) -> StoreResult<Option<Project>> {
        self.timed(async {
            let mut conn = self.pool.acquire().await?;
            fetch_project(&mut conn, "project_id", SqlValue::Int(project_id)).await
        })
        .await
    }

    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<Page<Project>> {
        let filters = query.filters();
        self.timed(async {
            let mut conn = self.pool.acquire().await?;

            let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) OVER() AS total, ");
            qb.push(PROJECT_COLUMNS).push(" FROM project p");
            push_project_filters(&mut qb, query);
            push_paging(&mut qb, &filters, "internal_id");

            let rows = qb.build().fetch_all(&mut *conn).await?;
            let total = rows.first().map(|r| r.try_get::<i64, _>("total")).transpose()?;
            let mut items = rows.iter().map(project_from_row).collect::<Result<Vec<_>, _>>()?;
            attach_associations(&mut conn, &mut items).await?;

            Ok(Page {
                items,
                metadata: page_metadata(total, &filters),
            })
        })
        .await
    }

    async fn update_project(
        &self,
        internal_id: SerialId,
        expected_version: i32,
        changes: ProjectChanges,
    ) -> StoreResult<Project> {
        self.timed(async {
            let values = field_values(&changes.fields)?;
            let mut utx = UpdateTransaction::begin(&self.pool, "project", internal_id).await?;
            let result = async {
                utx.guard_version(
                    "project",
                    "internal_id",
                    SqlValue::Int(internal_id),
                    expected_version,
                    values,
                )
                .await?;

                utx.reconcile(&PROJECT_CLIENTS, SqlValue::Int(internal_id), changes.client_ids.as_deref())
                    .await?;
                // Existing assignment rows follow a changed project_id through ON UPDATE CASCADE
                utx.reconcile(
                    &PROJECT_ASSIGNMENTS,
                    SqlValue::Int(changes.fields.project_id),
                    changes.assignments.as_deref(),
                )
                .await?;

                fetch_project(utx.conn(), "internal_id", SqlValue::Int(internal_id))
                    .await?
                    .ok_or(StoreError::NotFound)
            }
            .await;
            utx.finish(result).await
        })
        .await
    }

    async fn delete_project(&self, project_id: SerialId) -> StoreResult<bool> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM project WHERE project_id = $1")
                .bind(project_id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
