pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use api::handlers;
pub use api::routes;

pub use model::*;

pub use store::{MemoryStore, PostgresStore, Store, StoreError, StoreResult};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::{AppConfig, StoreBackend};

fn seeding_requested() -> bool {
    std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true"
}

async fn serve_store<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<Router> {
    if seeding_requested() {
        log::info!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
    }
    Ok(routes::create_router::<S>(&config.server.environment).with_state(store))
}

/// Open the configured backend, run migrations and optional seeding, and build the router
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    match config.store.backend {
        StoreBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let store = PostgresStore::with_options(
                &config.database_url()?,
                config.database.max_connections,
                config.deadline(),
            )
            .await?;
            store.migrate().await?;
            log::info!("Database migrations applied");
            serve_store(Arc::new(store), config).await
        }
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; data is lost on shutdown");
            serve_store(Arc::new(MemoryStore::new()), config).await
        }
    }
}

pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let app = build_app(&config).await?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!(
        "Starting {} server on http://{}",
        config.server.environment,
        bind_address
    );

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_memory_backend_builds_without_database() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;

        let app = build_app(&config).await.unwrap();
        let response = app
            .oneshot(Request::builder().uri("/v1/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
