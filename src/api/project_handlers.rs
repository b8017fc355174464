use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, not_found, store_error, validated, ApiResult, AppState, MessageResponse,
};
use crate::logic::validate::{validate_new_project, validate_project_patch, validate_project_query, Validator};
use crate::model::{
    Assignment, FeatureChange, NewProject, Page, Project, ProjectChanges, ProjectFields, ProjectInput,
    ProjectQuery, SerialId, UserContext,
};
use crate::store::traits::Store;

/// Map client names onto ids, recording every unknown name on `client_names`
async fn resolve_client_names<S: Store>(
    store: &S,
    v: &mut Validator,
    names: &[String],
) -> ApiResult<Vec<SerialId>> {
    let clients = store.find_clients_by_names(names).await.map_err(store_error)?;
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        match clients.iter().find(|c| &c.name == name) {
            Some(client) => ids.push(client.id),
            None => v.add_error("client_names", &format!("client {} does not exist", name)),
        }
    }
    Ok(ids)
}

pub async fn list_projects<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<Page<Project>>> {
    let mut v = Validator::new();
    validate_project_query(&mut v, &query);
    validated(v)?;

    store.list_projects(&query).await.map(Json).map_err(store_error)
}

pub async fn create_project<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<ProjectInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    let feature = validate_new_project(&mut v, &input);
    validated(v)?;

    let mut v = Validator::new();
    let client_names = input.client_names.clone().unwrap_or_default();
    let client_ids = resolve_client_names(&*store, &mut v, &client_names).await?;
    validated(v)?;

    let fields = ProjectFields {
        project_id: input.project_id.unwrap_or_default(),
        proposal_id: input.proposal_id.clone().unwrap_or_default(),
        name: input.name.clone().unwrap_or_default(),
        status: input.status.clone().unwrap_or_default(),
        feature: match feature {
            Some(FeatureChange::Set(feature)) => Some(feature),
            Some(FeatureChange::Clear) | None => None,
        },
        note: input.note.clone(),
        images: input.images.clone().unwrap_or_default(),
    };
    let project = store
        .insert_project(NewProject {
            fields,
            client_ids,
            assignments: input.assignment_members().unwrap_or_default(),
        })
        .await
        .map_err(store_error)?;

    log::info!("{} created project {}", user, project.fields.project_id);
    Ok(created(format!("/v1/projects/{}", project.fields.project_id), project))
}

pub async fn get_project<S: Store>(
    State(store): State<AppState<S>>,
    Path(project_id): Path<SerialId>,
) -> ApiResult<Json<Project>> {
    store
        .get_project(project_id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("project"))
}

/// Partial update: supplied fields replace the stored ones, `client_names` and
/// `assignments` replace their association sets when present
pub async fn update_project<S: Store>(
    State(store): State<AppState<S>>,
    Path(project_id): Path<SerialId>,
    user: UserContext,
    RequestJson(input): RequestJson<ProjectInput>,
) -> ApiResult<Json<Project>> {
    let project = store
        .get_project(project_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("project"))?;

    let mut v = Validator::new();
    let feature = validate_project_patch(&mut v, &input);
    validated(v)?;

    let mut v = Validator::new();
    let client_ids = match &input.client_names {
        Some(names) => Some(resolve_client_names(&*store, &mut v, names).await?),
        None => None,
    };
    validated(v)?;

    let changes = ProjectChanges {
        fields: project.merged_fields(&input, feature),
        client_ids,
        assignments: input.assignment_members(),
    };
    let expected_version = input.version.unwrap_or(project.version);
    let updated = store
        .update_project(project.internal_id, expected_version, changes)
        .await
        .map_err(store_error)?;

    log::info!(
        "{} updated project {} to version {}",
        user,
        updated.fields.project_id,
        updated.version
    );
    Ok(Json(updated))
}

pub async fn delete_project<S: Store>(
    State(store): State<AppState<S>>,
    Path(project_id): Path<SerialId>,
    user: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_project(project_id).await.map_err(store_error)? {
        return Err(not_found("project"));
    }
    log::info!("{} deleted project {}", user, project_id);
    Ok(deleted("project"))
}

pub async fn list_project_assignments<S: Store>(
    State(store): State<AppState<S>>,
    Path(project_id): Path<SerialId>,
) -> ApiResult<Json<Vec<Assignment>>> {
    if store.get_project(project_id).await.map_err(store_error)?.is_none() {
        return Err(not_found("project"));
    }
    store
        .assignments_for_project(project_id)
        .await
        .map(Json)
        .map_err(store_error)
}
