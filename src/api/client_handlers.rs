use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, not_found, store_error, validated, ApiResult, AppState, MessageResponse,
};
use crate::logic::validate::{validate_client, validate_filters, Validator};
use crate::model::{Client, ClientInput, NameQuery, Page, SerialId, UserContext};
use crate::store::traits::Store;

pub async fn list_clients<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<NameQuery>,
) -> ApiResult<Json<Page<Client>>> {
    let mut v = Validator::new();
    validate_filters(&mut v, &query.filters());
    validated(v)?;

    store.list_clients(&query).await.map(Json).map_err(store_error)
}

pub async fn create_client<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<ClientInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_client(&mut v, &input, true);
    validated(v)?;

    let client = store
        .insert_client(input.into_new_client())
        .await
        .map_err(store_error)?;
    log::info!("{} created client {} ({})", user, client.id, client.name);
    Ok(created(format!("/v1/clients/{}", client.id), client))
}

pub async fn get_client<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
) -> ApiResult<Json<Client>> {
    match store.get_client(id).await.map_err(store_error)? {
        Some(client) => Ok(Json(client)),
        None => Err(not_found("client")),
    }
}

pub async fn update_client<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
    user: UserContext,
    RequestJson(input): RequestJson<ClientInput>,
) -> ApiResult<Json<Client>> {
    let mut client = store
        .get_client(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("client"))?;

    let mut v = Validator::new();
    validate_client(&mut v, &input, false);
    validated(v)?;

    client.merge(&input);
    if let Some(version) = input.version {
        client.version = version;
    }
    let updated = store.update_client(&client).await.map_err(store_error)?;
    log::info!("{} updated client {} to version {}", user, id, updated.version);
    Ok(Json(updated))
}

pub async fn delete_client<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<SerialId>,
    user: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_client(id).await.map_err(store_error)? {
        return Err(not_found("client"));
    }
    log::info!("{} deleted client {}", user, id);
    Ok(deleted("client"))
}
