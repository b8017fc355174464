use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::api::catalog_handlers::{self, Activities, Roles};
use crate::api::{
    client_handlers, handlers, project_handlers, proposal_handlers, timesheet_handlers, user_handlers,
};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>(environment: &str) -> Router<Arc<S>> {
    let environment = environment.to_string();

    Router::new()
        .route(
            "/v1/healthcheck",
            get(move || handlers::health_check(environment.clone())),
        )
        // Projects
        .route(
            "/v1/projects",
            get(project_handlers::list_projects::<S>).post(project_handlers::create_project::<S>),
        )
        .route(
            "/v1/projects/:project_id",
            get(project_handlers::get_project::<S>)
                .patch(project_handlers::update_project::<S>)
                .delete(project_handlers::delete_project::<S>),
        )
        .route(
            "/v1/projects/:project_id/assignments",
            get(project_handlers::list_project_assignments::<S>),
        )
        // Clients
        .route(
            "/v1/clients",
            get(client_handlers::list_clients::<S>).post(client_handlers::create_client::<S>),
        )
        .route(
            "/v1/clients/:id",
            get(client_handlers::get_client::<S>)
                .patch(client_handlers::update_client::<S>)
                .delete(client_handlers::delete_client::<S>),
        )
        // Proposals
        .route(
            "/v1/proposals",
            axum::routing::post(proposal_handlers::create_proposal::<S>),
        )
        .route(
            "/v1/proposals/:proposal_id",
            get(proposal_handlers::get_proposal::<S>)
                .patch(proposal_handlers::update_proposal::<S>)
                .delete(proposal_handlers::delete_proposal::<S>),
        )
        // Activities and roles
        .route(
            "/v1/activities",
            get(catalog_handlers::list_entries::<S, Activities>)
                .post(catalog_handlers::create_entry::<S, Activities>),
        )
        .route(
            "/v1/activities/:id",
            get(catalog_handlers::get_entry::<S, Activities>)
                .patch(catalog_handlers::update_entry::<S, Activities>)
                .delete(catalog_handlers::delete_entry::<S, Activities>),
        )
        .route(
            "/v1/roles",
            get(catalog_handlers::list_entries::<S, Roles>).post(catalog_handlers::create_entry::<S, Roles>),
        )
        .route(
            "/v1/roles/:id",
            get(catalog_handlers::get_entry::<S, Roles>)
                .patch(catalog_handlers::update_entry::<S, Roles>)
                .delete(catalog_handlers::delete_entry::<S, Roles>),
        )
        // Users
        .route(
            "/v1/users",
            get(user_handlers::list_users::<S>).post(user_handlers::register_user::<S>),
        )
        .route(
            "/v1/users/:id",
            get(user_handlers::get_user::<S>)
                .patch(user_handlers::update_user::<S>)
                .delete(user_handlers::delete_user::<S>),
        )
        .route(
            "/v1/users/:id/assignments",
            get(user_handlers::list_user_assignments::<S>),
        )
        // Timesheets
        .route(
            "/v1/timesheets",
            get(timesheet_handlers::list_timesheets::<S>).post(timesheet_handlers::create_timesheet::<S>),
        )
        .route(
            "/v1/timesheets/:id",
            get(timesheet_handlers::get_timesheet::<S>)
                .patch(timesheet_handlers::update_timesheet::<S>)
                .delete(timesheet_handlers::delete_timesheet::<S>),
        )
        .layer(middleware::from_fn(log_requests))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::{ErrorResponse, HealthResponse};
    use crate::model::{Client, Page, Project};
    use crate::store::memory::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, StatusCode};
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(store: Arc<MemoryStore>) -> Router {
        create_router::<MemoryStore>("testing").with_state(store)
    }

    async fn send(
        store: &Arc<MemoryStore>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Vec<u8>) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app(store.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, location, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn seed_clients(store: &Arc<MemoryStore>) {
        for name in ["Acme", "Skynet"] {
            let (status, _, _) = send(store, Method::POST, "/v1/clients", Some(json!({ "name": name }))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    fn project_body() -> Value {
        json!({
            "project_id": 24001,
            "proposal_id": "P001-24",
            "name": "Harbour Bridge",
            "status": "active",
            "client_names": ["Acme"]
        })
    }

    #[tokio::test]
    async fn test_healthcheck_reports_environment() {
        let store = Arc::new(MemoryStore::new());
        let (status, _, body) = send(&store, Method::GET, "/v1/healthcheck", None).await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = parse(&body);
        assert_eq!(health.status, "available");
        assert_eq!(health.environment, "testing");
    }

    #[tokio::test]
    async fn test_create_client_sets_location() {
        let store = Arc::new(MemoryStore::new());
        let (status, location, body) =
            send(&store, Method::POST, "/v1/clients", Some(json!({ "name": "Acme" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let client: Client = parse(&body);
        assert_eq!(location, Some(format!("/v1/clients/{}", client.id)));
        assert_eq!(client.version, 1);
    }

    #[tokio::test]
    async fn test_project_update_then_stale_version_conflicts() {
        let store = Arc::new(MemoryStore::new());
        seed_clients(&store).await;
        let (status, location, _) = send(&store, Method::POST, "/v1/projects", Some(project_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(location.as_deref(), Some("/v1/projects/24001"));

        let patch = json!({ "client_names": ["Acme", "Skynet"], "version": 1 });
        let (status, _, body) = send(&store, Method::PATCH, "/v1/projects/24001", Some(patch.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let project: Project = parse(&body);
        assert_eq!(project.version, 2);
        assert_eq!(project.clients.len(), 2);

        let (status, _, body) = send(&store, Method::PATCH, "/v1/projects/24001", Some(patch)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let error: ErrorResponse = parse(&body);
        assert!(error.error.contains("edit conflict"));
    }

    #[tokio::test]
    async fn test_unknown_client_name_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed_clients(&store).await;
        let mut body = project_body();
        body["client_names"] = json!(["Initech"]);

        let (status, _, body) = send(&store, Method::POST, "/v1/projects", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorResponse = parse(&body);
        assert!(error.fields.unwrap().contains_key("client_names"));
    }

    #[tokio::test]
    async fn test_duplicate_client_name_is_field_error() {
        let store = Arc::new(MemoryStore::new());
        seed_clients(&store).await;
        let (status, _, body) = send(&store, Method::POST, "/v1/clients", Some(json!({ "name": "Acme" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorResponse = parse(&body);
        assert!(error.fields.unwrap().contains_key("name"));
    }

    #[tokio::test]
    async fn test_list_rejects_unsafe_sort() {
        let store = Arc::new(MemoryStore::new());
        let (status, _, _) = send(&store, Method::GET, "/v1/clients?sort=password", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        seed_clients(&store).await;
        let (status, _, body) = send(&store, Method::GET, "/v1/clients?sort=-name&page_size=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let page: Page<Client> = parse(&body);
        assert_eq!(page.items[0].name, "Skynet");
        assert_eq!(page.metadata.last_page, 2);
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        for uri in ["/v1/projects/999", "/v1/clients/7", "/v1/roles/3", "/v1/timesheets/nope"] {
            let (status, _, _) = send(&store, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        }
        let (status, _, _) = send(&store, Method::DELETE, "/v1/activities/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
