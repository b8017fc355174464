//! Runs against a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use pm_api_rust::model::{NewClient, NewProject, ProjectChanges, ProjectFields, SerialId};
use pm_api_rust::store::{ClientStore, ProjectStore, StoreError};
use pm_api_rust::PostgresStore;
use std::sync::Arc;
use uuid::Uuid;

async fn connect() -> Option<PostgresStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let store = PostgresStore::new(&url).await.unwrap();
    store.migrate().await.unwrap();
    Some(store)
}

// Fresh names and ids so repeated runs against one database do not collide
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn unique_project_id() -> SerialId {
    (Uuid::new_v4().as_u128() % 1_000_000_000) as SerialId + 1
}

async fn client(store: &PostgresStore, name: &str) -> SerialId {
    store
        .insert_client(NewClient {
            name: name.to_string(),
            address: None,
            logo_url: None,
            note: None,
        })
        .await
        .unwrap()
        .id
}

fn fields(project_id: SerialId) -> ProjectFields {
    ProjectFields {
        project_id,
        proposal_id: unique("P"),
        name: "Harbour Bridge".to_string(),
        status: "active".to_string(),
        feature: None,
        note: None,
        images: Vec::new(),
    }
}

#[tokio::test]
#[ignore]
async fn test_add_client_then_stale_retry_conflicts() {
    let Some(store) = connect().await else { return };
    let acme = client(&store, &unique("Acme")).await;
    let skynet = client(&store, &unique("Skynet")).await;
    let project_id = unique_project_id();

    let created = store
        .insert_project(NewProject {
            fields: fields(project_id),
            client_ids: vec![acme],
            assignments: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(created.version, 1);
    let fetched = store.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(fetched.fields, created.fields);

    let changes = ProjectChanges {
        fields: created.fields.clone(),
        client_ids: Some(vec![acme, skynet]),
        assignments: None,
    };
    let updated = store
        .update_project(created.internal_id, 1, changes.clone())
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.clients.len(), 2);

    let stale = store.update_project(created.internal_id, 1, changes.clone()).await;
    assert!(matches!(stale, Err(StoreError::EditConflict)));

    // Same set again adds nothing
    let again = store.update_project(created.internal_id, 2, changes).await.unwrap();
    assert_eq!(again.version, 3);
    assert_eq!(again.clients.len(), 2);

    let cleared = store
        .update_project(
            created.internal_id,
            3,
            ProjectChanges {
                fields: created.fields.clone(),
                client_ids: Some(Vec::new()),
                assignments: None,
            },
        )
        .await
        .unwrap();
    assert!(cleared.clients.is_empty());

    assert!(store.delete_project(project_id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_failed_reconcile_rolls_back_version() {
    let Some(store) = connect().await else { return };
    let acme = client(&store, &unique("Acme")).await;
    let project_id = unique_project_id();
    let created = store
        .insert_project(NewProject {
            fields: fields(project_id),
            client_ids: vec![acme],
            assignments: Vec::new(),
        })
        .await
        .unwrap();

    let result = store
        .update_project(
            created.internal_id,
            1,
            ProjectChanges {
                fields: created.fields.clone(),
                client_ids: Some(vec![i32::MAX]),
                assignments: None,
            },
        )
        .await;
    assert!(matches!(result, Err(StoreError::Constraint { .. })));

    let current = store.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.clients.len(), 1);

    assert!(store.delete_project(project_id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_updates_only_one_wins() {
    let Some(store) = connect().await else { return };
    let store = Arc::new(store);
    let acme = client(&store, &unique("Acme")).await;
    let project_id = unique_project_id();
    let created = store
        .insert_project(NewProject {
            fields: fields(project_id),
            client_ids: vec![acme],
            assignments: Vec::new(),
        })
        .await
        .unwrap();

    let spawn_update = |name: &str| {
        let store = store.clone();
        let mut fields = created.fields.clone();
        fields.name = name.to_string();
        let internal_id = created.internal_id;
        tokio::spawn(async move {
            store
                .update_project(
                    internal_id,
                    1,
                    ProjectChanges {
                        fields,
                        client_ids: None,
                        assignments: None,
                    },
                )
                .await
        })
    };
    let (a, b) = tokio::join!(spawn_update("North"), spawn_update("South"));
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::EditConflict)))
            .count(),
        1
    );

    assert!(store.delete_project(project_id).await.unwrap());
}
