//! In-process store with the same update protocol as the PostgreSQL backend.
//!
//! Every write runs against a copy of the tables under one lock; the copy replaces
//! the live tables only when the whole unit succeeds, which gives the
//! all-or-nothing behavior of a database transaction. Unique and foreign-key
//! checks report the same constraint names as the SQL schema.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

use crate::logic::search::sort_and_page;
use crate::model::{
    contains_ignore_case, parse_date, Assignment, AssignmentMember, Catalog, CatalogEntry, Client, DateRange,
    JoinedTimesheet, NameQuery, NamedRef, NewClient, NewProject, NewTimesheet, NewUser, Page, Project,
    ProjectAssignment, ProjectChanges, ProjectClient, ProjectFields, ProjectQuery, Proposal, SerialId, Timesheet,
    TimesheetProject, TimesheetQuery, TimesheetStatus, TimesheetUser, Timestamp, User, UserQuery,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{
    AssignmentStore, CatalogStore, ClientStore, ProjectStore, ProposalStore, Store, TimesheetStore, UserStore,
};
use crate::store::update::{plan_reconcile, AssociationPlan, PhaseTracker, UpdatePhase};

/// Rows that carry a version column
trait Versioned {
    fn version(&self) -> i32;
    fn bump(&mut self, now: Timestamp);
}

macro_rules! impl_versioned {
    ($($ty:ty),*) => {
        $(impl Versioned for $ty {
            fn version(&self) -> i32 {
                self.version
            }

            fn bump(&mut self, now: Timestamp) {
                self.version += 1;
                self.updated_at = now;
            }
        })*
    };
}

#[derive(Debug, Clone)]
struct ProjectRecord {
    internal_id: SerialId,
    fields: ProjectFields,
    version: i32,
    created_at: Timestamp,
    updated_at: Timestamp,
}

#[derive(Debug, Clone)]
struct TimesheetRecord {
    id: String,
    work_date: NaiveDate,
    work_minutes: i32,
    description: String,
    status: TimesheetStatus,
    version: i32,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl_versioned!(Client, Proposal, CatalogEntry, User, ProjectRecord, TimesheetRecord);

/// Compare-and-bump on the primary row. A missing row or a version mismatch is an edit conflict.
fn guard_version<'a, V: Versioned>(
    row: Option<&'a mut V>,
    expected_version: i32,
    tracker: &mut PhaseTracker,
) -> StoreResult<&'a mut V> {
    let row = row
        .filter(|r| r.version() == expected_version)
        .ok_or(StoreError::EditConflict)?;
    row.bump(Utc::now());
    tracker.advance(UpdatePhase::VersionChecked);
    Ok(row)
}

fn members_of<O: Ord, M: Clone>(rows: &BTreeSet<(O, M)>, owner: &O) -> Vec<M> {
    rows.iter()
        .filter(|(o, _)| o == owner)
        .map(|(_, m)| m.clone())
        .collect()
}

fn first_member<O: Ord, M: Clone>(rows: &BTreeSet<(O, M)>, owner: &O) -> Option<M> {
    rows.iter().find(|(o, _)| o == owner).map(|(_, m)| m.clone())
}

/// Bring the rows owned by `owner` to exactly `desired`
fn reconcile_set<O, M>(rows: &mut BTreeSet<(O, M)>, owner: &O, desired: &[M]) -> AssociationPlan<M>
where
    O: Ord + Clone,
    M: Ord + Clone + Hash,
{
    let current = members_of(rows, owner);
    let plan = plan_reconcile(&current, desired);
    for member in &plan.to_delete {
        rows.remove(&(owner.clone(), member.clone()));
    }
    for member in &plan.to_insert {
        rows.insert((owner.clone(), member.clone()));
    }
    plan
}

fn next_id(seq: &mut SerialId) -> SerialId {
    *seq += 1;
    *seq
}

#[derive(Debug, Clone, Default)]
struct Tables {
    client_seq: SerialId,
    clients: BTreeMap<SerialId, Client>,
    proposal_seq: SerialId,
    proposals: BTreeMap<SerialId, Proposal>,
    activity_seq: SerialId,
    activities: BTreeMap<SerialId, CatalogEntry>,
    role_seq: SerialId,
    roles: BTreeMap<SerialId, CatalogEntry>,
    users: BTreeMap<String, User>,
    project_seq: SerialId,
    projects: BTreeMap<SerialId, ProjectRecord>,
    /// (project internal_id, client id)
    project_clients: BTreeSet<(SerialId, SerialId)>,
    /// (external project_id, employee and role)
    assignments: BTreeSet<(SerialId, AssignmentMember)>,
    timesheets: BTreeMap<String, TimesheetRecord>,
    timesheet_users: BTreeSet<(String, String)>,
    timesheet_projects: BTreeSet<(String, SerialId)>,
    timesheet_clients: BTreeSet<(String, SerialId)>,
    timesheet_activities: BTreeSet<(String, SerialId)>,
}

impl Tables {
    fn catalog(&self, catalog: Catalog) -> &BTreeMap<SerialId, CatalogEntry> {
        match catalog {
            Catalog::Activity => &self.activities,
            Catalog::Role => &self.roles,
        }
    }

    fn catalog_mut(&mut self, catalog: Catalog) -> (&mut SerialId, &mut BTreeMap<SerialId, CatalogEntry>) {
        match catalog {
            Catalog::Activity => (&mut self.activity_seq, &mut self.activities),
            Catalog::Role => (&mut self.role_seq, &mut self.roles),
        }
    }

    fn project_by_external(&self, project_id: SerialId) -> Option<&ProjectRecord> {
        self.projects.values().find(|p| p.fields.project_id == project_id)
    }

    fn check_client_name(&self, name: &str, own_id: Option<SerialId>) -> StoreResult<()> {
        if self.clients.values().any(|c| c.name == name && Some(c.id) != own_id) {
            return Err(StoreError::duplicate("client_name_key"));
        }
        Ok(())
    }

    fn check_project_keys(&self, fields: &ProjectFields, own_id: Option<SerialId>) -> StoreResult<()> {
        if fields.project_id <= 0 {
            return Err(StoreError::constraint("project_project_id_check"));
        }
        let others = || self.projects.values().filter(|p| Some(p.internal_id) != own_id);
        if others().any(|p| p.fields.project_id == fields.project_id) {
            return Err(StoreError::duplicate("project_project_id_key"));
        }
        if others().any(|p| p.fields.proposal_id == fields.proposal_id) {
            return Err(StoreError::duplicate("project_proposal_id_key"));
        }
        Ok(())
    }

    fn check_project_links(&self, client_ids: &[SerialId], assignments: &[AssignmentMember]) -> StoreResult<()> {
        if client_ids.iter().any(|id| !self.clients.contains_key(id)) {
            return Err(StoreError::constraint("project_client_client_id_fkey"));
        }
        if assignments.iter().any(|a| !self.users.contains_key(&a.employee_id)) {
            return Err(StoreError::constraint("assignment_employee_id_fkey"));
        }
        if assignments.iter().any(|a| !self.roles.contains_key(&a.role_id)) {
            return Err(StoreError::constraint("assignment_role_id_fkey"));
        }
        Ok(())
    }

    fn check_timesheet_links(&self, user_id: &str, project_id: SerialId, client_id: SerialId, activity_id: SerialId) -> StoreResult<()> {
        if !self.users.contains_key(user_id) {
            return Err(StoreError::constraint("timesheet_appuser_user_id_fkey"));
        }
        if self.project_by_external(project_id).is_none() {
            return Err(StoreError::constraint("timesheet_project_project_id_fkey"));
        }
        if !self.clients.contains_key(&client_id) {
            return Err(StoreError::constraint("timesheet_client_client_id_fkey"));
        }
        if !self.activities.contains_key(&activity_id) {
            return Err(StoreError::constraint("timesheet_activity_activity_id_fkey"));
        }
        Ok(())
    }

    fn project_view(&self, record: &ProjectRecord) -> Project {
        let clients = members_of(&self.project_clients, &record.internal_id)
            .into_iter()
            .filter_map(|id| self.clients.get(&id))
            .map(|c| ProjectClient {
                id: c.id,
                name: c.name.clone(),
                address: c.address.clone(),
                logo_url: c.logo_url.clone(),
                note: c.note.clone(),
            })
            .collect();

        let assignments = members_of(&self.assignments, &record.fields.project_id)
            .into_iter()
            .filter_map(|m| {
                let user = self.users.get(&m.employee_id)?;
                let role = self.roles.get(&m.role_id)?;
                Some(ProjectAssignment {
                    employee_id: m.employee_id,
                    employee_email: user.email.clone(),
                    role_id: m.role_id,
                    role_name: role.name.clone(),
                })
            })
            .collect();

        Project {
            internal_id: record.internal_id,
            fields: record.fields.clone(),
            clients,
            assignments,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn timesheet_view(&self, record: &TimesheetRecord) -> Timesheet {
        Timesheet {
            id: record.id.clone(),
            user_id: first_member(&self.timesheet_users, &record.id).unwrap_or_default(),
            project_id: first_member(&self.timesheet_projects, &record.id).unwrap_or_default(),
            client_id: first_member(&self.timesheet_clients, &record.id).unwrap_or_default(),
            activity_id: first_member(&self.timesheet_activities, &record.id).unwrap_or_default(),
            work_date: record.work_date,
            work_minutes: record.work_minutes,
            description: record.description.clone(),
            status: record.status,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn joined_view(&self, record: &TimesheetRecord) -> JoinedTimesheet {
        let user = first_member(&self.timesheet_users, &record.id)
            .and_then(|id| self.users.get(&id))
            .map(|u| TimesheetUser {
                id: u.id.clone(),
                email: u.email.clone(),
                first_name: u.first_name.clone(),
                last_name: u.last_name.clone(),
            });
        let project = first_member(&self.timesheet_projects, &record.id)
            .and_then(|id| self.project_by_external(id))
            .map(|p| TimesheetProject {
                project_id: p.fields.project_id,
                name: p.fields.name.clone(),
            });
        let client = first_member(&self.timesheet_clients, &record.id)
            .and_then(|id| self.clients.get(&id))
            .map(|c| NamedRef {
                id: c.id,
                name: c.name.clone(),
            });
        let activity = first_member(&self.timesheet_activities, &record.id)
            .and_then(|id| self.activities.get(&id))
            .map(|a| NamedRef {
                id: a.id,
                name: a.name.clone(),
            });

        JoinedTimesheet {
            id: record.id.clone(),
            user,
            project,
            client,
            activity,
            work_date: record.work_date,
            work_minutes: record.work_minutes,
            description: record.description.clone(),
            status: record.status,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn link_timesheet(&mut self, id: &str, user_id: &str, project_id: SerialId, client_id: SerialId, activity_id: SerialId) {
        let owner = id.to_string();
        reconcile_set(&mut self.timesheet_users, &owner, &[user_id.to_string()]);
        reconcile_set(&mut self.timesheet_projects, &owner, &[project_id]);
        reconcile_set(&mut self.timesheet_clients, &owner, &[client_id]);
        reconcile_set(&mut self.timesheet_activities, &owner, &[activity_id]);
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.lock())
    }

    /// Apply `f` to a working copy; publish it only if `f` succeeds
    fn transact<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self.tables.lock();
        let mut working = tables.clone();
        let value = f(&mut working)?;
        *tables = working;
        Ok(value)
    }

    /// A versioned update, tracked through the same phases as the SQL backend
    fn update<T>(
        &self,
        entity: &'static str,
        key: impl fmt::Display,
        f: impl FnOnce(&mut Tables, &mut PhaseTracker) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tracker = PhaseTracker::start(entity, key);
        let result = self.transact(|tables| {
            let value = f(tables, &mut tracker)?;
            tracker.advance(UpdatePhase::AssociationsReconciled);
            Ok(value)
        });
        tracker.finish(result)
    }
}

#[async_trait::async_trait]
impl ClientStore for MemoryStore {
    async fn insert_client(&self, client: NewClient) -> StoreResult<Client> {
        self.transact(|t| {
            t.check_client_name(&client.name, None)?;
            let now = Utc::now();
            let created = Client {
                id: next_id(&mut t.client_seq),
                name: client.name,
                address: client.address,
                logo_url: client.logo_url,
                note: client.note,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            t.clients.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn get_client(&self, id: SerialId) -> StoreResult<Option<Client>> {
        Ok(self.read(|t| t.clients.get(&id).cloned()))
    }

    async fn list_clients(&self, query: &NameQuery) -> StoreResult<Page<Client>> {
        let items: Vec<Client> = self.read(|t| {
            t.clients
                .values()
                .filter(|c| query.name.as_ref().map_or(true, |n| contains_ignore_case(&c.name, n)))
                .cloned()
                .collect()
        });
        Ok(sort_and_page(
            items,
            &query.filters(),
            |column, a, b| match column {
                "name" => a.name.cmp(&b.name),
                _ => a.id.cmp(&b.id),
            },
            |a, b| a.id.cmp(&b.id),
        ))
    }

    async fn find_clients_by_names(&self, names: &[String]) -> StoreResult<Vec<Client>> {
        Ok(self.read(|t| t.clients.values().filter(|c| names.contains(&c.name)).cloned().collect()))
    }

    async fn update_client(&self, client: &Client) -> StoreResult<Client> {
        self.update("client", client.id, |t, tracker| {
            t.check_client_name(&client.name, Some(client.id))?;
            let row = guard_version(t.clients.get_mut(&client.id), client.version, tracker)?;
            row.name = client.name.clone();
            row.address = client.address.clone();
            row.logo_url = client.logo_url.clone();
            row.note = client.note.clone();
            Ok(row.clone())
        })
    }

    async fn delete_client(&self, id: SerialId) -> StoreResult<bool> {
        self.transact(|t| {
            let removed = t.clients.remove(&id).is_some();
            t.project_clients.retain(|(_, client_id)| *client_id != id);
            t.timesheet_clients.retain(|(_, client_id)| *client_id != id);
            Ok(removed)
        })
    }
}

#[async_trait::async_trait]
impl ProposalStore for MemoryStore {
    async fn insert_proposal(&self, proposal_id: &str) -> StoreResult<Proposal> {
        self.transact(|t| {
            if t.proposals.values().any(|p| p.proposal_id == proposal_id) {
                return Err(StoreError::duplicate("proposal_proposal_id_key"));
            }
            let now = Utc::now();
            let created = Proposal {
                internal_id: next_id(&mut t.proposal_seq),
                proposal_id: proposal_id.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            t.proposals.insert(created.internal_id, created.clone());
            Ok(created)
        })
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        Ok(self.read(|t| t.proposals.values().find(|p| p.proposal_id == proposal_id).cloned()))
    }

    async fn update_proposal(&self, proposal: &Proposal) -> StoreResult<Proposal> {
        self.update("proposal", proposal.internal_id, |t, tracker| {
            if t
                .proposals
                .values()
                .any(|p| p.proposal_id == proposal.proposal_id && p.internal_id != proposal.internal_id)
            {
                return Err(StoreError::duplicate("proposal_proposal_id_key"));
            }
            let row = guard_version(t.proposals.get_mut(&proposal.internal_id), proposal.version, tracker)?;
            row.proposal_id = proposal.proposal_id.clone();
            Ok(row.clone())
        })
    }

    async fn delete_proposal(&self, proposal_id: &str) -> StoreResult<bool> {
        self.transact(|t| {
            let before = t.proposals.len();
            t.proposals.retain(|_, p| p.proposal_id != proposal_id);
            Ok(t.proposals.len() < before)
        })
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_entry(&self, catalog: Catalog, name: &str) -> StoreResult<CatalogEntry> {
        self.transact(|t| {
            if t.catalog(catalog).values().any(|e| e.name == name) {
                return Err(StoreError::duplicate(catalog.name_constraint()));
            }
            let (seq, entries) = t.catalog_mut(catalog);
            let now = Utc::now();
            let created = CatalogEntry {
                id: next_id(seq),
                name: name.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            entries.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn get_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<Option<CatalogEntry>> {
        Ok(self.read(|t| t.catalog(catalog).get(&id).cloned()))
    }

    async fn list_entries(&self, catalog: Catalog, query: &NameQuery) -> StoreResult<Page<CatalogEntry>> {
        let items: Vec<CatalogEntry> = self.read(|t| {
            t.catalog(catalog)
                .values()
                .filter(|e| query.name.as_ref().map_or(true, |n| contains_ignore_case(&e.name, n)))
                .cloned()
                .collect()
        });
        Ok(sort_and_page(
            items,
            &query.filters(),
            |column, a, b| match column {
                "name" => a.name.cmp(&b.name),
                _ => a.id.cmp(&b.id),
            },
            |a, b| a.id.cmp(&b.id),
        ))
    }

    async fn update_entry(&self, catalog: Catalog, entry: &CatalogEntry) -> StoreResult<CatalogEntry> {
        self.update(catalog.table(), entry.id, |t, tracker| {
            if t
                .catalog(catalog)
                .values()
                .any(|e| e.name == entry.name && e.id != entry.id)
            {
                return Err(StoreError::duplicate(catalog.name_constraint()));
            }
            let (_, entries) = t.catalog_mut(catalog);
            let row = guard_version(entries.get_mut(&entry.id), entry.version, tracker)?;
            row.name = entry.name.clone();
            Ok(row.clone())
        })
    }

    async fn delete_entry(&self, catalog: Catalog, id: SerialId) -> StoreResult<bool> {
        self.transact(|t| {
            let (_, entries) = t.catalog_mut(catalog);
            let removed = entries.remove(&id).is_some();
            match catalog {
                Catalog::Activity => t.timesheet_activities.retain(|(_, activity_id)| *activity_id != id),
                Catalog::Role => t.assignments.retain(|(_, member)| member.role_id != id),
            }
            Ok(removed)
        })
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.transact(|t| {
            if t.users.contains_key(&user.id) {
                return Err(StoreError::duplicate("appuser_pkey"));
            }
            if t.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::duplicate("appuser_email_key"));
            }
            let now = Utc::now();
            let created = User {
                id: user.id,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                password_hash: user.password_hash,
                activated: false,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            t.users.insert(created.id.clone(), created.clone());
            Ok(created)
        })
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|t| t.users.get(id).cloned()))
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>> {
        let text = |filter: &Option<String>, value: &str| filter.as_ref().is_some_and(|f| contains_ignore_case(value, f));
        let matches = |u: &User| {
            !query.has_filters()
                || text(&query.email, &u.email)
                || text(&query.first_name, &u.first_name)
                || text(&query.last_name, &u.last_name)
        };
        let items: Vec<User> = self.read(|t| t.users.values().filter(|u| matches(u)).cloned().collect());
        Ok(sort_and_page(
            items,
            &query.filters(),
            |column, a, b| match column {
                "email" => a.email.cmp(&b.email),
                "first_name" => a.first_name.cmp(&b.first_name),
                "last_name" => a.last_name.cmp(&b.last_name),
                _ => a.id.cmp(&b.id),
            },
            |a, b| a.id.cmp(&b.id),
        ))
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        self.update("user", &user.id, |t, tracker| {
            if t.users.values().any(|u| u.email == user.email && u.id != user.id) {
                return Err(StoreError::duplicate("appuser_email_key"));
            }
            let row = guard_version(t.users.get_mut(&user.id), user.version, tracker)?;
            row.email = user.email.clone();
            row.first_name = user.first_name.clone();
            row.last_name = user.last_name.clone();
            row.password_hash = user.password_hash.clone();
            row.activated = user.activated;
            Ok(row.clone())
        })
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        self.transact(|t| {
            let removed = t.users.remove(id).is_some();
            t.assignments.retain(|(_, member)| member.employee_id != id);
            t.timesheet_users.retain(|(_, user_id)| user_id != id);
            Ok(removed)
        })
    }
}

#[async_trait::async_trait]
impl AssignmentStore for MemoryStore {
    async fn assignments_for_project(&self, project_id: SerialId) -> StoreResult<Vec<Assignment>> {
        Ok(self.read(|t| {
            members_of(&t.assignments, &project_id)
                .iter()
                .map(|m| m.for_project(project_id))
                .collect()
        }))
    }

    async fn assignments_for_employee(&self, employee_id: &str) -> StoreResult<Vec<Assignment>> {
        Ok(self.read(|t| {
            t.assignments
                .iter()
                .filter(|(_, m)| m.employee_id == employee_id)
                .map(|(project_id, m)| m.for_project(*project_id))
                .collect()
        }))
    }
}

fn project_matches(project: &Project, query: &ProjectQuery) -> bool {
    if !query.has_filters() {
        return true;
    }
    let text = |filter: &Option<String>, value: &str| filter.as_ref().is_some_and(|f| contains_ignore_case(value, f));
    let full_address = project
        .fields
        .feature
        .as_ref()
        .and_then(|f| f.full_address())
        .unwrap_or_default();

    text(&query.name, &project.fields.name)
        || text(&query.status, &project.fields.status)
        || text(&query.project_id, &project.fields.project_id.to_string())
        || text(&query.proposal_id, &project.fields.proposal_id)
        || text(&query.full_address, full_address)
        || project.clients.iter().any(|c| text(&query.client_name, &c.name))
        || query
            .bounding_box()
            .zip(project.fields.feature.as_ref())
            .is_some_and(|(bbox, feature)| bbox.contains(feature))
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        self.transact(|t| {
            t.check_project_keys(&project.fields, None)?;
            t.check_project_links(&project.client_ids, &project.assignments)?;

            let now = Utc::now();
            let record = ProjectRecord {
                internal_id: next_id(&mut t.project_seq),
                fields: project.fields,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            reconcile_set(&mut t.project_clients, &record.internal_id, &project.client_ids);
            reconcile_set(&mut t.assignments, &record.fields.project_id, &project.assignments);
            let created = t.project_view(&record);
            t.projects.insert(record.internal_id, record);
            Ok(created)
        })
    }

    async fn get_project(&self, project_id: SerialId) -> StoreResult<Option<Project>> {
        Ok(self.read(|t| t.project_by_external(project_id).map(|r| t.project_view(r))))
    }

    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<Page<Project>> {
        let items: Vec<Project> = self.read(|t| {
            t.projects
                .values()
                .map(|r| t.project_view(r))
                .filter(|p| project_matches(p, query))
                .collect()
        });
        Ok(sort_and_page(
            items,
            &query.filters(),
            |column, a, b| match column {
                "name" => a.fields.name.cmp(&b.fields.name),
                "status" => a.fields.status.cmp(&b.fields.status),
                _ => a.fields.project_id.cmp(&b.fields.project_id),
            },
            |a, b| a.internal_id.cmp(&b.internal_id),
        ))
    }

    async fn update_project(
        &self,
        internal_id: SerialId,
        expected_version: i32,
        changes: ProjectChanges,
    ) -> StoreResult<Project> {
        self.update("project", internal_id, |t, tracker| {
            let row = guard_version(t.projects.get_mut(&internal_id), expected_version, tracker)?;
            let old_project_id = row.fields.project_id;

            t.check_project_keys(&changes.fields, Some(internal_id))?;
            t.check_project_links(
                changes.client_ids.as_deref().unwrap_or_default(),
                changes.assignments.as_deref().unwrap_or_default(),
            )?;

            let row = t.projects.get_mut(&internal_id).ok_or(StoreError::NotFound)?;
            row.fields = changes.fields;
            let new_project_id = row.fields.project_id;

            // ON UPDATE CASCADE for rows keyed by the external project id
            if old_project_id != new_project_id {
                let moved: Vec<AssignmentMember> = members_of(&t.assignments, &old_project_id);
                t.assignments.retain(|(project_id, _)| *project_id != old_project_id);
                t.assignments.extend(moved.into_iter().map(|m| (new_project_id, m)));
                let linked: Vec<String> = t
                    .timesheet_projects
                    .iter()
                    .filter(|(_, project_id)| *project_id == old_project_id)
                    .map(|(timesheet_id, _)| timesheet_id.clone())
                    .collect();
                for timesheet_id in linked {
                    t.timesheet_projects.remove(&(timesheet_id.clone(), old_project_id));
                    t.timesheet_projects.insert((timesheet_id, new_project_id));
                }
            }

            if let Some(client_ids) = &changes.client_ids {
                reconcile_set(&mut t.project_clients, &internal_id, client_ids);
            }
            if let Some(assignments) = &changes.assignments {
                reconcile_set(&mut t.assignments, &new_project_id, assignments);
            }

            let record = t.projects.get(&internal_id).ok_or(StoreError::NotFound)?;
            Ok(t.project_view(record))
        })
    }

    async fn delete_project(&self, project_id: SerialId) -> StoreResult<bool> {
        self.transact(|t| {
            let Some(internal_id) = t.project_by_external(project_id).map(|p| p.internal_id) else {
                return Ok(false);
            };
            t.projects.remove(&internal_id);
            t.project_clients.retain(|(owner, _)| *owner != internal_id);
            t.assignments.retain(|(owner, _)| *owner != project_id);
            t.timesheet_projects.retain(|(_, p)| *p != project_id);
            Ok(true)
        })
    }
}

fn timesheet_matches(timesheet: &JoinedTimesheet, query: &TimesheetQuery, dates: &DateRange) -> bool {
    let text = |filter: &Option<String>, value: Option<&str>| match filter {
        Some(f) => value.is_some_and(|v| contains_ignore_case(v, f)),
        None => true,
    };
    let user = timesheet.user.as_ref();
    let project = timesheet.project.as_ref();
    let activity = timesheet.activity.as_ref();

    query.user_id.as_ref().map_or(true, |id| user.is_some_and(|u| &u.id == id))
        && text(&query.email, user.map(|u| u.email.as_str()))
        && text(&query.first_name, user.map(|u| u.first_name.as_str()))
        && text(&query.last_name, user.map(|u| u.last_name.as_str()))
        && query.project_id.map_or(true, |id| project.is_some_and(|p| p.project_id == id))
        && text(&query.project_name, project.map(|p| p.name.as_str()))
        && query.activity_id.map_or(true, |id| activity.is_some_and(|a| a.id == id))
        && text(&query.activity_name, activity.map(|a| a.name.as_str()))
        && dates.contains(timesheet.work_date)
}

#[async_trait::async_trait]
impl TimesheetStore for MemoryStore {
    async fn insert_timesheet(&self, timesheet: NewTimesheet) -> StoreResult<Timesheet> {
        self.transact(|t| {
            if t.timesheets.contains_key(&timesheet.id) {
                return Err(StoreError::duplicate("timesheet_pkey"));
            }
            t.check_timesheet_links(
                &timesheet.user_id,
                timesheet.project_id,
                timesheet.client_id,
                timesheet.activity_id,
            )?;

            let now = Utc::now();
            let record = TimesheetRecord {
                id: timesheet.id.clone(),
                work_date: timesheet.work_date,
                work_minutes: timesheet.work_minutes,
                description: timesheet.description.clone(),
                status: TimesheetStatus::Active,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            t.link_timesheet(
                &record.id,
                &timesheet.user_id,
                timesheet.project_id,
                timesheet.client_id,
                timesheet.activity_id,
            );
            let created = t.timesheet_view(&record);
            t.timesheets.insert(record.id.clone(), record);
            Ok(created)
        })
    }

    async fn get_timesheet(&self, id: &str) -> StoreResult<Option<Timesheet>> {
        Ok(self.read(|t| t.timesheets.get(id).map(|r| t.timesheet_view(r))))
    }

    async fn list_timesheets(&self, query: &TimesheetQuery) -> StoreResult<Page<JoinedTimesheet>> {
        let dates = DateRange {
            on: query.work_date.as_deref().and_then(parse_date),
            from: query.from_date.as_deref().and_then(parse_date),
            to: query.to_date.as_deref().and_then(parse_date),
        };
        let items: Vec<JoinedTimesheet> = self.read(|t| {
            t.timesheets
                .values()
                .map(|r| t.joined_view(r))
                .filter(|j| timesheet_matches(j, query, &dates))
                .collect()
        });
        Ok(sort_and_page(
            items,
            &query.filters(),
            |column, a, b| match column {
                // Unlinked entries sort as NULL does in Postgres: last ascending, first descending
                "project_id" => match (&a.project, &b.project) {
                    (Some(x), Some(y)) => x.project_id.cmp(&y.project_id),
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                },
                "work_date" => a.work_date.cmp(&b.work_date),
                _ => a.id.cmp(&b.id),
            },
            |a, b| a.id.cmp(&b.id),
        ))
    }

    async fn daily_minutes(&self, user_id: &str, work_date: NaiveDate, excluding: Option<&str>) -> StoreResult<i32> {
        Ok(self.read(|t| {
            t.timesheet_users
                .iter()
                .filter(|(timesheet_id, user)| user == user_id && Some(timesheet_id.as_str()) != excluding)
                .filter_map(|(timesheet_id, _)| t.timesheets.get(timesheet_id))
                .filter(|r| r.work_date == work_date)
                .map(|r| r.work_minutes)
                .sum()
        }))
    }

    async fn update_timesheet(&self, timesheet: &Timesheet) -> StoreResult<Timesheet> {
        self.update("timesheet", &timesheet.id, |t, tracker| {
            guard_version(t.timesheets.get_mut(&timesheet.id), timesheet.version, tracker)?;
            t.check_timesheet_links(
                &timesheet.user_id,
                timesheet.project_id,
                timesheet.client_id,
                timesheet.activity_id,
            )?;

            let row = t.timesheets.get_mut(&timesheet.id).ok_or(StoreError::NotFound)?;
            row.work_date = timesheet.work_date;
            row.work_minutes = timesheet.work_minutes;
            row.description = timesheet.description.clone();
            row.status = timesheet.status;

            t.link_timesheet(
                &timesheet.id,
                &timesheet.user_id,
                timesheet.project_id,
                timesheet.client_id,
                timesheet.activity_id,
            );
            let record = t.timesheets.get(&timesheet.id).ok_or(StoreError::NotFound)?;
            Ok(t.timesheet_view(record))
        })
    }

    async fn delete_timesheet(&self, id: &str) -> StoreResult<bool> {
        self.transact(|t| {
            let removed = t.timesheets.remove(id).is_some();
            t.timesheet_users.retain(|(owner, _)| owner != id);
            t.timesheet_projects.retain(|(owner, _)| owner != id);
            t.timesheet_clients.retain(|(owner, _)| owner != id);
            t.timesheet_activities.retain(|(owner, _)| owner != id);
            Ok(removed)
        })
    }
}

impl Store for MemoryStore {}
