use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{Filters, SerialId, Timestamp};

/// Maximum minutes a single user may book on one calendar day
pub const MAX_DAILY_MINUTES: i32 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimesheetStatus {
    #[default]
    Active,
    Inactive,
    Canceled,
    Submitted,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetStatus::Active => "active",
            TimesheetStatus::Inactive => "inactive",
            TimesheetStatus::Canceled => "canceled",
            TimesheetStatus::Submitted => "submitted",
            TimesheetStatus::Approved => "approved",
            TimesheetStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TimesheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimesheetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TimesheetStatus::Active),
            "inactive" => Ok(TimesheetStatus::Inactive),
            "canceled" => Ok(TimesheetStatus::Canceled),
            "submitted" => Ok(TimesheetStatus::Submitted),
            "approved" => Ok(TimesheetStatus::Approved),
            "rejected" => Ok(TimesheetStatus::Rejected),
            _ => Err(format!("Invalid timesheet status: {}", s)),
        }
    }
}

/// A timesheet entry with its four associations resolved to ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timesheet {
    pub id: String,
    pub user_id: String,
    pub project_id: SerialId,
    pub client_id: SerialId,
    pub activity_id: SerialId,
    pub work_date: NaiveDate,
    #[serde(rename = "work_mins")]
    pub work_minutes: i32,
    pub description: String,
    pub status: TimesheetStatus,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Timesheet {
    /// Apply a validated patch; `work_date` is parsed during validation
    pub fn merge(&mut self, input: &TimesheetInput, work_date: Option<NaiveDate>, status: Option<TimesheetStatus>) {
        if let Some(user_id) = &input.user_id {
            self.user_id = user_id.clone();
        }
        if let Some(project_id) = input.project_id {
            self.project_id = project_id;
        }
        if let Some(client_id) = input.client_id {
            self.client_id = client_id;
        }
        if let Some(activity_id) = input.activity_id {
            self.activity_id = activity_id;
        }
        if let Some(work_date) = work_date {
            self.work_date = work_date;
        }
        if let Some(work_minutes) = input.work_minutes {
            self.work_minutes = work_minutes;
        }
        if let Some(description) = &input.description {
            self.description = description.clone();
        }
        if let Some(status) = status {
            self.status = status;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimesheetInput {
    pub user_id: Option<String>,
    pub project_id: Option<SerialId>,
    pub client_id: Option<SerialId>,
    pub activity_id: Option<SerialId>,
    pub work_date: Option<String>,
    #[serde(rename = "work_mins")]
    pub work_minutes: Option<i32>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTimesheet {
    pub id: String,
    pub user_id: String,
    pub project_id: SerialId,
    pub client_id: SerialId,
    pub activity_id: SerialId,
    pub work_date: NaiveDate,
    pub work_minutes: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetProject {
    pub project_id: SerialId,
    pub name: String,
}

/// Name reference used for the client and activity of a listed timesheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: SerialId,
    pub name: String,
}

/// Timesheet as returned by the list endpoint, associations expanded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedTimesheet {
    pub id: String,
    pub user: Option<TimesheetUser>,
    pub project: Option<TimesheetProject>,
    pub client: Option<NamedRef>,
    pub activity: Option<NamedRef>,
    pub work_date: NaiveDate,
    #[serde(rename = "work_mins")]
    pub work_minutes: i32,
    pub description: String,
    pub status: TimesheetStatus,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimesheetQuery {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub project_id: Option<SerialId>,
    pub project_name: Option<String>,
    pub activity_id: Option<SerialId>,
    pub activity_name: Option<String>,
    pub work_date: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

/// Parsed date bounds of a timesheet query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub on: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.on.map_or(true, |on| on == date)
            && self.from.map_or(true, |from| date >= from)
            && self.to.map_or(true, |to| date <= to)
    }
}

impl TimesheetQuery {
    pub const SORT_SAFELIST: [&'static str; 3] = ["id", "project_id", "work_date"];

    pub fn filters(&self) -> Filters {
        Filters::new(self.page, self.page_size, self.sort.clone(), &Self::SORT_SAFELIST)
    }
}
