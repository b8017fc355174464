use chrono::NaiveDate;

use crate::model::{
    Assignment, Catalog, CatalogEntry, Client, JoinedTimesheet, NameQuery, NewClient, NewProject, NewTimesheet,
    NewUser, Page, Project, ProjectChanges, ProjectQuery, Proposal, SerialId, Timesheet, TimesheetQuery, User,
    UserQuery,
};
use crate::store::error::StoreResult;

#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    async fn insert_client(&self, client: NewClient) -> StoreResult<Client>;
    async fn get_client(&self, id: SerialId) -> StoreResult<Option<Client>>;
    async fn list_clients(&self, query: &NameQuery) -> StoreResult<Page<Client>>;
    /// Clients whose names exactly match any of `names`
    async fn find_clients_by_names(&self, names: &[String]) -> StoreResult<Vec<Client>>;
    /// Version-guarded update; `client.version` is the expected version
    async fn update_client(&self, client: &Client) -> StoreResult<Client>;
    async fn delete_client(&self, id: SerialId) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait ProposalStore: Send + Sync {
    async fn insert_proposal(&self, proposal_id: &str) -> StoreResult<Proposal>;
    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>>;
    /// Version-guarded update keyed by `internal_id`
    async fn update_proposal(&self, proposal: &Proposal) -> StoreResult<Proposal>;
    async fn delete_proposal(&self, proposal_id: &str) -> StoreResult<bool>;
}

/// Activities and roles share one shape and one store surface
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_entry(&self, catalog: Catalog, name: &str) -> StoreResult<CatalogEntry>;
    async fn get_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<Option<CatalogEntry>>;
    async fn list_entries(&self, catalog: Catalog, query: &NameQuery) -> StoreResult<Page<CatalogEntry>>;
    async fn update_entry(&self, catalog: Catalog, entry: &CatalogEntry) -> StoreResult<CatalogEntry>;
    async fn delete_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>>;
    /// Version-guarded update of profile fields, password hash and activation flag
    async fn update_user(&self, user: &User) -> StoreResult<User>;
    async fn delete_user(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn assignments_for_project(&self, project_id: SerialId) -> StoreResult<Vec<Assignment>>;
    async fn assignments_for_employee(&self, employee_id: &str) -> StoreResult<Vec<Assignment>>;
}

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert_project(&self, project: NewProject) -> StoreResult<Project>;
    /// Look up by the external `project_id`
    async fn get_project(&self, project_id: SerialId) -> StoreResult<Option<Project>>;
    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<Page<Project>>;
    /// Version guard plus client and assignment reconciliation in one transaction
    async fn update_project(
        &self,
        internal_id: SerialId,
        expected_version: i32,
        changes: ProjectChanges,
    ) -> StoreResult<Project>;
    async fn delete_project(&self, project_id: SerialId) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait TimesheetStore: Send + Sync {
    async fn insert_timesheet(&self, timesheet: NewTimesheet) -> StoreResult<Timesheet>;
    async fn get_timesheet(&self, id: &str) -> StoreResult<Option<Timesheet>>;
    async fn list_timesheets(&self, query: &TimesheetQuery) -> StoreResult<Page<JoinedTimesheet>>;
    /// Minutes booked by a user on a date, optionally ignoring one entry
    async fn daily_minutes(&self, user_id: &str, work_date: NaiveDate, excluding: Option<&str>) -> StoreResult<i32>;
    /// Version guard plus reconciliation of the user, project, client and activity links
    async fn update_timesheet(&self, timesheet: &Timesheet) -> StoreResult<Timesheet>;
    async fn delete_timesheet(&self, id: &str) -> StoreResult<bool>;
}

pub trait Store:
    ClientStore + ProposalStore + CatalogStore + UserStore + AssignmentStore + ProjectStore + TimesheetStore + Send + Sync
{
}
