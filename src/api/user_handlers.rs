use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, internal_error, not_found, store_error, validated, ApiResult, AppState,
    MessageResponse,
};
use crate::logic::validate::{validate_filters, validate_user, Validator};
use crate::model::{
    generate_user_id, hash_password, Assignment, NewUser, Page, User, UserContext, UserInput, UserQuery,
};
use crate::store::error::StoreError;
use crate::store::traits::Store;

/// Fresh ids are retried this many times when one collides with an existing user
const ID_ATTEMPTS: usize = 3;

pub async fn list_users<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Page<User>>> {
    let mut v = Validator::new();
    validate_filters(&mut v, &query.filters());
    validated(v)?;

    store.list_users(&query).await.map(Json).map_err(store_error)
}

pub async fn register_user<S: Store>(
    State(store): State<AppState<S>>,
    caller: UserContext,
    RequestJson(input): RequestJson<UserInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_user(&mut v, &input, true);
    validated(v)?;

    let password_hash = hash_password(input.password.clone().unwrap_or_default())
        .await
        .map_err(internal_error)?;

    let mut attempt = 0;
    let user = loop {
        attempt += 1;
        let new_user = NewUser {
            id: generate_user_id(),
            email: input.email.clone().unwrap_or_default(),
            first_name: input.first_name.clone().unwrap_or_default(),
            last_name: input.last_name.clone().unwrap_or_default(),
            password_hash: password_hash.clone(),
        };
        match store.insert_user(new_user).await {
            Ok(user) => break user,
            Err(StoreError::DuplicateKey { constraint }) if constraint == "appuser_pkey" && attempt < ID_ATTEMPTS => {
                log::warn!("generated user id collided, retrying");
            }
            Err(err) => return Err(store_error(err)),
        }
    };

    log::info!("{} registered user {} ({})", caller, user.id, user.email);
    Ok(created(format!("/v1/users/{}", user.id), user))
}

pub async fn get_user<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    store
        .get_user(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("user"))
}

pub async fn update_user<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
    caller: UserContext,
    RequestJson(input): RequestJson<UserInput>,
) -> ApiResult<Json<User>> {
    let mut user = store
        .get_user(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("user"))?;

    let mut v = Validator::new();
    validate_user(&mut v, &input, false);
    validated(v)?;

    user.merge(&input);
    if let Some(password) = input.password.clone() {
        user.password_hash = hash_password(password).await.map_err(internal_error)?;
    }
    if let Some(version) = input.version {
        user.version = version;
    }
    let updated = store.update_user(&user).await.map_err(store_error)?;
    log::info!("{} updated user {} to version {}", caller, id, updated.version);
    Ok(Json(updated))
}

pub async fn delete_user<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
    caller: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_user(&id).await.map_err(store_error)? {
        return Err(not_found("user"));
    }
    log::info!("{} deleted user {}", caller, id);
    Ok(deleted("user"))
}

pub async fn list_user_assignments<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Assignment>>> {
    if store.get_user(&id).await.map_err(store_error)?.is_none() {
        return Err(not_found("user"));
    }
    store
        .assignments_for_employee(&id)
        .await
        .map(Json)
        .map_err(store_error)
}
