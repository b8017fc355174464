//! Activities and roles are served by the same handlers, picked per route by a marker type.

use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, not_found, store_error, validated, ApiResult, AppState, MessageResponse,
};
use crate::logic::validate::{validate_catalog_name, validate_filters, Validator};
use crate::model::{Catalog, CatalogEntry, CatalogInput, NameQuery, Page, SerialId, UserContext};
use crate::store::traits::Store;

pub trait CatalogKind: Send + Sync + 'static {
    const CATALOG: Catalog;
    const PATH: &'static str;
}

pub struct Activities;

impl CatalogKind for Activities {
    const CATALOG: Catalog = Catalog::Activity;
    const PATH: &'static str = "/v1/activities";
}

pub struct Roles;

impl CatalogKind for Roles {
    const CATALOG: Catalog = Catalog::Role;
    const PATH: &'static str = "/v1/roles";
}

pub async fn list_entries<S: Store, K: CatalogKind>(
    State(store): State<AppState<S>>,
    Query(query): Query<NameQuery>,
) -> ApiResult<Json<Page<CatalogEntry>>> {
    let mut v = Validator::new();
    validate_filters(&mut v, &query.filters());
    validated(v)?;

    store
        .list_entries(K::CATALOG, &query)
        .await
        .map(Json)
        .map_err(store_error)
}

pub async fn create_entry<S: Store, K: CatalogKind>(
    State(store): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<CatalogInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_catalog_name(&mut v, K::CATALOG, input.name.as_deref());
    validated(v)?;

    let name = input.name.unwrap_or_default();
    let entry = store
        .insert_entry(K::CATALOG, &name)
        .await
        .map_err(store_error)?;
    log::info!("{} created {} {} ({})", user, K::CATALOG, entry.id, entry.name);
    Ok(created(format!("{}/{}", K::PATH, entry.id), entry))
}

pub async fn get_entry<S: Store, K: CatalogKind>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
) -> ApiResult<Json<CatalogEntry>> {
    store
        .get_entry(K::CATALOG, id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(K::CATALOG.table()))
}

pub async fn update_entry<S: Store, K: CatalogKind>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
    user: UserContext,
    RequestJson(input): RequestJson<CatalogInput>,
) -> ApiResult<Json<CatalogEntry>> {
    let mut entry = store
        .get_entry(K::CATALOG, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(K::CATALOG.table()))?;

    let mut v = Validator::new();
    validate_catalog_name(&mut v, K::CATALOG, input.name.as_deref());
    validated(v)?;

    if let Some(name) = input.name {
        entry.name = name;
    }
    if let Some(version) = input.version {
        entry.version = version;
    }
    let updated = store
        .update_entry(K::CATALOG, &entry)
        .await
        .map_err(store_error)?;
    log::info!("{} updated {} {} to version {}", user, K::CATALOG, id, updated.version);
    Ok(Json(updated))
}

pub async fn delete_entry<S: Store, K: CatalogKind>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
    user: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_entry(K::CATALOG, id).await.map_err(store_error)? {
        return Err(not_found(K::CATALOG.table()));
    }
    log::info!("{} deleted {} {}", user, K::CATALOG, id);
    Ok(deleted(K::CATALOG.table()))
}
