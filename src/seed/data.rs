use anyhow::{Context, Result};

use crate::model::{Catalog, Feature, NewClient, NewProject, ProjectFields};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::Store;

const CLIENTS: [(&str, &str); 3] = [
    ("Acme", "1 Road Runner Way, Phoenix"),
    ("Skynet", "18144 El Camino Real, Sunnyvale"),
    ("Initech", "4120 Freidrich Lane, Austin"),
];

const ACTIVITIES: [&str; 4] = ["Design", "Site visit", "Reporting", "Meetings"];

const ROLES: [&str; 3] = ["Project manager", "Engineer", "Architect"];

/// Rows that already exist count as loaded, so seeding can run on every start
fn ignore_duplicate<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::DuplicateKey { constraint }) => {
            log::debug!("seed row already present ({})", constraint);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<()> {
    for (name, address) in CLIENTS {
        ignore_duplicate(
            store
                .insert_client(NewClient {
                    name: name.to_string(),
                    address: Some(address.to_string()),
                    logo_url: None,
                    note: None,
                })
                .await,
        )
        .with_context(|| format!("Failed to seed client {}", name))?;
    }

    for (catalog, names) in [(Catalog::Activity, &ACTIVITIES[..]), (Catalog::Role, &ROLES[..])] {
        for name in names {
            ignore_duplicate(store.insert_entry(catalog, name).await)
                .with_context(|| format!("Failed to seed {} {}", catalog, name))?;
        }
    }

    ignore_duplicate(store.insert_proposal("P001-24").await).context("Failed to seed proposal")?;

    if store.get_project(24001).await?.is_none() {
        let acme = store.find_clients_by_names(&["Acme".to_string()]).await?;
        ignore_duplicate(
            store
                .insert_project(NewProject {
                    fields: ProjectFields {
                        project_id: 24001,
                        proposal_id: "P001-24".to_string(),
                        name: "Harbour Bridge Survey".to_string(),
                        status: "active".to_string(),
                        feature: Some(Feature::point(
                            151.2108,
                            -33.8523,
                            "Harbour Bridge",
                            "Sydney Harbour Bridge, Sydney NSW 2000",
                        )),
                        note: None,
                        images: Vec::new(),
                    },
                    client_ids: acme.iter().map(|c| c.id).collect(),
                    assignments: Vec::new(),
                })
                .await,
        )
        .context("Failed to seed project")?;
    }

    log::info!(
        "Seed data loaded: {} clients, {} activities, {} roles",
        CLIENTS.len(),
        ACTIVITIES.len(),
        ROLES.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NameQuery;
    use crate::store::memory::MemoryStore;
    use crate::store::traits::{CatalogStore, ClientStore, ProjectStore};

    #[tokio::test]
    async fn test_seeding_twice_is_harmless() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();

        let clients = store.list_clients(&NameQuery::default()).await.unwrap();
        assert_eq!(clients.metadata.total_records, 3);
        let roles = store.list_entries(Catalog::Role, &NameQuery::default()).await.unwrap();
        assert_eq!(roles.items.len(), 3);

        let project = store.get_project(24001).await.unwrap().unwrap();
        assert_eq!(project.version, 1);
        assert_eq!(project.clients[0].name, "Acme");
    }
}
