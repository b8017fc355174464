use axum::{
    extract::{Path, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, not_found, store_error, validated, ApiResult, AppState, MessageResponse,
};
use crate::logic::validate::{validate_proposal_id, Validator};
use crate::model::{Proposal, ProposalInput, UserContext};
use crate::store::traits::Store;

pub async fn create_proposal<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<ProposalInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_proposal_id(&mut v, input.proposal_id.as_deref());
    validated(v)?;

    let proposal_id = input.proposal_id.unwrap_or_default();
    let proposal = store.insert_proposal(&proposal_id).await.map_err(store_error)?;
    log::info!("{} created proposal {}", user, proposal.proposal_id);
    Ok(created(format!("/v1/proposals/{}", proposal.proposal_id), proposal))
}

pub async fn get_proposal<S: Store>(
    State(store): State<AppState<S>>,
    Path(proposal_id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    store
        .get_proposal(&proposal_id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("proposal"))
}

pub async fn update_proposal<S: Store>(
    State(store): State<AppState<S>>,
    Path(proposal_id): Path<String>,
    user: UserContext,
    RequestJson(input): RequestJson<ProposalInput>,
) -> ApiResult<Json<Proposal>> {
    let mut proposal = store
        .get_proposal(&proposal_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("proposal"))?;

    let mut v = Validator::new();
    validate_proposal_id(&mut v, input.proposal_id.as_deref());
    validated(v)?;

    if let Some(new_id) = input.proposal_id {
        proposal.proposal_id = new_id;
    }
    if let Some(version) = input.version {
        proposal.version = version;
    }
    let updated = store.update_proposal(&proposal).await.map_err(store_error)?;
    log::info!("{} renamed proposal {} to {}", user, proposal_id, updated.proposal_id);
    Ok(Json(updated))
}

pub async fn delete_proposal<S: Store>(
    State(store): State<AppState<S>>,
    Path(proposal_id): Path<String>,
    user: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_proposal(&proposal_id).await.map_err(store_error)? {
        return Err(not_found("proposal"));
    }
    log::info!("{} deleted proposal {}", user, proposal_id);
    Ok(deleted("proposal"))
}
