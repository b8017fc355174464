use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub type Timestamp = DateTime<Utc>;

/// Serial primary key used by clients, proposals, activities, roles and projects
pub type SerialId = i32;

/// Calendar date format accepted for timesheet work dates and date filters
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const USER_ID_LEN: usize = 8;

/// Generate an 8-character user id
pub fn generate_user_id() -> String {
    Uuid::new_v4().simple().to_string()[..USER_ID_LEN].to_string()
}

/// Generate a ULID for a new timesheet entry
pub fn generate_timesheet_id() -> String {
    ulid::Ulid::new().to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Case-insensitive substring match used by the list filters
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
