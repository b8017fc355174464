use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    Json as RequestJson,
};

use crate::api::handlers::{
    created, deleted, not_found, store_error, validated, validation_failed, ApiResult, AppState,
    MessageResponse,
};
use crate::logic::timesheet_rules::{check_timesheet_rules, RuleCheck};
use crate::logic::validate::{
    validate_new_timesheet, validate_timesheet_patch, validate_timesheet_query, ValidationErrors, Validator,
};
use crate::model::{
    generate_timesheet_id, JoinedTimesheet, NewTimesheet, Page, Timesheet, TimesheetInput, TimesheetQuery,
    UserContext,
};
use crate::store::traits::Store;

pub async fn list_timesheets<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<TimesheetQuery>,
) -> ApiResult<Json<Page<JoinedTimesheet>>> {
    let mut v = Validator::new();
    validate_timesheet_query(&mut v, &query);
    validated(v)?;

    store.list_timesheets(&query).await.map(Json).map_err(store_error)
}

pub async fn create_timesheet<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<TimesheetInput>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    let work_date = validate_new_timesheet(&mut v, &input);
    validated(v)?;
    let Some(work_date) = work_date else {
        return Err(validation_failed(ValidationErrors::single("work_date", "must be provided")));
    };

    let timesheet = NewTimesheet {
        id: generate_timesheet_id(),
        user_id: input.user_id.clone().unwrap_or_default(),
        project_id: input.project_id.unwrap_or_default(),
        client_id: input.client_id.unwrap_or_default(),
        activity_id: input.activity_id.unwrap_or_default(),
        work_date,
        work_minutes: input.work_minutes.unwrap_or_default(),
        description: input.description.clone().unwrap_or_default(),
    };

    let mut v = Validator::new();
    check_timesheet_rules(&*store, &mut v, (&timesheet).into(), RuleCheck::Create)
        .await
        .map_err(store_error)?;
    validated(v)?;

    let created_entry = store.insert_timesheet(timesheet).await.map_err(store_error)?;
    log::info!(
        "{} booked {} minutes for {} on project {}",
        user,
        created_entry.work_minutes,
        created_entry.user_id,
        created_entry.project_id
    );
    Ok(created(format!("/v1/timesheets/{}", created_entry.id), created_entry))
}

pub async fn get_timesheet<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Timesheet>> {
    store
        .get_timesheet(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("timesheet"))
}

pub async fn update_timesheet<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
    user: UserContext,
    RequestJson(input): RequestJson<TimesheetInput>,
) -> ApiResult<Json<Timesheet>> {
    let mut timesheet = store
        .get_timesheet(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("timesheet"))?;

    let mut v = Validator::new();
    let (work_date, status) = validate_timesheet_patch(&mut v, &input);
    validated(v)?;

    timesheet.merge(&input, work_date, status);
    if let Some(version) = input.version {
        timesheet.version = version;
    }

    let mut v = Validator::new();
    check_timesheet_rules(&*store, &mut v, (&timesheet).into(), RuleCheck::Update(&id))
        .await
        .map_err(store_error)?;
    validated(v)?;

    let updated = store.update_timesheet(&timesheet).await.map_err(store_error)?;
    log::info!("{} updated timesheet {} to version {}", user, id, updated.version);
    Ok(Json(updated))
}

pub async fn delete_timesheet<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<String>,
    user: UserContext,
) -> ApiResult<Json<MessageResponse>> {
    if !store.delete_timesheet(&id).await.map_err(store_error)? {
        return Err(not_found("timesheet"));
    }
    log::info!("{} deleted timesheet {}", user, id);
    Ok(deleted("timesheet"))
}
