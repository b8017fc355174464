//! Cross-entity rules a timesheet entry must satisfy before it is written.

use chrono::NaiveDate;

use crate::logic::validate::Validator;
use crate::model::{Catalog, NewTimesheet, SerialId, Timesheet, MAX_DAILY_MINUTES};
use crate::store::error::StoreResult;
use crate::store::traits::Store;

/// The references and booking a timesheet entry carries
#[derive(Debug, Clone, Copy)]
pub struct TimesheetLinks<'a> {
    pub user_id: &'a str,
    pub project_id: SerialId,
    pub client_id: SerialId,
    pub activity_id: SerialId,
    pub work_date: NaiveDate,
    pub work_minutes: i32,
}

impl<'a> From<&'a NewTimesheet> for TimesheetLinks<'a> {
    fn from(t: &'a NewTimesheet) -> Self {
        Self {
            user_id: &t.user_id,
            project_id: t.project_id,
            client_id: t.client_id,
            activity_id: t.activity_id,
            work_date: t.work_date,
            work_minutes: t.work_minutes,
        }
    }
}

impl<'a> From<&'a Timesheet> for TimesheetLinks<'a> {
    fn from(t: &'a Timesheet) -> Self {
        Self {
            user_id: &t.user_id,
            project_id: t.project_id,
            client_id: t.client_id,
            activity_id: t.activity_id,
            work_date: t.work_date,
            work_minutes: t.work_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCheck<'a> {
    Create,
    /// Update of the entry with this id; its own minutes are left out of the daily total
    Update(&'a str),
}

/// Record every rule violation on `v`.
///
/// On create the user, project, client and activity must exist. On update the
/// activity is left to the store's referential integrity.
pub async fn check_timesheet_rules<S: Store + ?Sized>(
    store: &S,
    v: &mut Validator,
    links: TimesheetLinks<'_>,
    mode: RuleCheck<'_>,
) -> StoreResult<()> {
    let user = store.get_user(links.user_id).await?;
    let project = store.get_project(links.project_id).await?;

    if mode == RuleCheck::Create {
        v.check(user.is_some(), "user_id", "user does not exist");
        v.check(project.is_some(), "project_id", "project does not exist");
        let client = store.get_client(links.client_id).await?;
        v.check(client.is_some(), "client_id", "client does not exist");
        let activity = store.get_entry(Catalog::Activity, links.activity_id).await?;
        v.check(activity.is_some(), "activity_id", "activity does not exist");
    }

    if let (Some(user), Some(project)) = (&user, &project) {
        let assigned = project.assignments.iter().any(|a| a.employee_id == user.id);
        v.check(assigned, "user_id", "user is not assigned to this project");
        let associated = project.clients.iter().any(|c| c.id == links.client_id);
        v.check(associated, "client_id", "client is not associated with this project");
    }

    let excluding = match mode {
        RuleCheck::Create => None,
        RuleCheck::Update(id) => Some(id),
    };
    let booked = store.daily_minutes(links.user_id, links.work_date, excluding).await?;
    if booked + links.work_minutes > MAX_DAILY_MINUTES {
        log::debug!(
            "user {} would book {} minutes on {}",
            links.user_id,
            booked + links.work_minutes,
            links.work_date
        );
        v.add_error("work_mins", "total work minutes for the day must not exceed 1440");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentMember, NewClient, NewProject, NewUser, ProjectFields};
    use crate::store::memory::MemoryStore;
    use crate::store::traits::{CatalogStore, ClientStore, ProjectStore, TimesheetStore, UserStore};

    struct Fixture {
        store: MemoryStore,
        client_id: SerialId,
        activity_id: SerialId,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let acme = store
            .insert_client(NewClient {
                name: "Acme".to_string(),
                address: None,
                logo_url: None,
                note: None,
            })
            .await
            .unwrap();
        store
            .insert_client(NewClient {
                name: "Skynet".to_string(),
                address: None,
                logo_url: None,
                note: None,
            })
            .await
            .unwrap();
        let role = store.insert_entry(Catalog::Role, "Engineer").await.unwrap();
        let activity = store.insert_entry(Catalog::Activity, "Design").await.unwrap();
        for (id, email) in [("abcd1234", "ada@example.com"), ("efgh5678", "alan@example.com")] {
            store
                .insert_user(NewUser {
                    id: id.to_string(),
                    email: email.to_string(),
                    first_name: "Test".to_string(),
                    last_name: "User".to_string(),
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
        }
        store
            .insert_project(NewProject {
                fields: ProjectFields {
                    project_id: 24001,
                    proposal_id: "P001-24".to_string(),
                    name: "Harbour Bridge".to_string(),
                    status: "active".to_string(),
                    feature: None,
                    note: None,
                    images: Vec::new(),
                },
                client_ids: vec![acme.id],
                assignments: vec![AssignmentMember::new("abcd1234", role.id)],
            })
            .await
            .unwrap();

        Fixture {
            store,
            client_id: acme.id,
            activity_id: activity.id,
        }
    }

    fn entry(f: &Fixture, user_id: &str, minutes: i32) -> NewTimesheet {
        NewTimesheet {
            id: crate::model::generate_timesheet_id(),
            user_id: user_id.to_string(),
            project_id: 24001,
            client_id: f.client_id,
            activity_id: f.activity_id,
            work_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            work_minutes: minutes,
            description: String::new(),
        }
    }

    async fn check(f: &Fixture, t: &NewTimesheet, mode: RuleCheck<'_>) -> Result<(), crate::logic::ValidationErrors> {
        let mut v = Validator::new();
        check_timesheet_rules(&f.store, &mut v, t.into(), mode).await.unwrap();
        v.finish()
    }

    #[tokio::test]
    async fn test_assigned_user_with_associated_client_passes() {
        let f = fixture().await;
        assert!(check(&f, &entry(&f, "abcd1234", 480), RuleCheck::Create).await.is_ok());
    }

    #[tokio::test]
    async fn test_unassigned_user_is_rejected() {
        let f = fixture().await;
        let errors = check(&f, &entry(&f, "efgh5678", 60), RuleCheck::Create).await.unwrap_err();
        assert_eq!(errors.get("user_id"), Some("user is not assigned to this project"));
    }

    #[tokio::test]
    async fn test_client_outside_project_is_rejected() {
        let f = fixture().await;
        let mut t = entry(&f, "abcd1234", 60);
        t.client_id = f.client_id + 1;
        let errors = check(&f, &t, RuleCheck::Create).await.unwrap_err();
        assert_eq!(errors.get("client_id"), Some("client is not associated with this project"));
    }

    #[tokio::test]
    async fn test_missing_references_are_reported_on_create() {
        let f = fixture().await;
        let mut t = entry(&f, "zzzz9999", 60);
        t.project_id = 99999;
        t.activity_id = f.activity_id + 10;
        let errors = check(&f, &t, RuleCheck::Create).await.unwrap_err();
        assert_eq!(errors.get("user_id"), Some("user does not exist"));
        assert_eq!(errors.get("project_id"), Some("project does not exist"));
        assert_eq!(errors.get("activity_id"), Some("activity does not exist"));
    }

    #[tokio::test]
    async fn test_daily_total_is_capped() {
        let f = fixture().await;
        let first = entry(&f, "abcd1234", 1000);
        f.store.insert_timesheet(first.clone()).await.unwrap();

        let errors = check(&f, &entry(&f, "abcd1234", 441), RuleCheck::Create).await.unwrap_err();
        assert!(errors.get("work_mins").is_some());
        assert!(check(&f, &entry(&f, "abcd1234", 440), RuleCheck::Create).await.is_ok());

        // Rewriting the existing entry does not count its old minutes
        let mut rewrite = first.clone();
        rewrite.work_minutes = 1440;
        assert!(check(&f, &rewrite, RuleCheck::Update(&first.id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_does_not_recheck_activity() {
        let f = fixture().await;
        let mut t = entry(&f, "abcd1234", 60);
        t.activity_id = f.activity_id + 10;
        assert!(check(&f, &t, RuleCheck::Update("01HTS0000000000000000000ZZ")).await.is_ok());
    }
}
