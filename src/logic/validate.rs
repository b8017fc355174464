use chrono::NaiveDate;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{
    parse_date, BoundingBox, Catalog, ClientInput, DateRange, Feature, FeatureChange, Filters, Geometry,
    ProjectInput, ProjectQuery, TimesheetInput, TimesheetQuery, TimesheetStatus, UserInput, MAX_DAILY_MINUTES,
    MAX_PAGE, MAX_PAGE_SIZE, USER_ID_LEN,
};

lazy_static! {
    static ref EMAIL_RX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .expect("email pattern is valid");
}

pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Field-keyed validation failures; the first message recorded for a field wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(key, message);
        errors
    }

    pub fn add(&mut self, key: &str, message: &str) {
        self.0
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(key, message)| format!("{}: {}", key, message))
            .join("; ");
        write!(f, "{}", joined)
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors.add(key, message);
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn is_unique(values: &[String]) -> bool {
    values.iter().all_unique()
}

fn check_text(v: &mut Validator, value: &str, key: &str, max: usize) {
    v.check(!value.is_empty(), key, "must not be empty");
    v.check(value.len() <= max, key, &format!("must not be more than {} bytes long", max));
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(filters.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
    v.check(filters.sort_is_safe(), "sort", "invalid sort value");
}

pub fn validate_proposal_id(v: &mut Validator, proposal_id: Option<&str>) {
    match proposal_id {
        Some(proposal_id) => check_text(v, proposal_id, "proposal_id", 10),
        None => v.add_error("proposal_id", "must be provided"),
    }
}

/// Checks a client body; `name` is only required when creating
pub fn validate_client(v: &mut Validator, input: &ClientInput, creating: bool) {
    match &input.name {
        Some(name) => check_text(v, name, "name", 500),
        None if creating => v.add_error("name", "must be provided"),
        None => {}
    }
    if let Some(address) = &input.address {
        check_text(v, address, "address", 500);
    }
    if let Some(logo_url) = &input.logo_url {
        check_text(v, logo_url, "logo_url", 500);
    }
    if let Some(note) = &input.note {
        check_text(v, note, "note", 500);
    }
}

pub fn validate_catalog_name(v: &mut Validator, catalog: Catalog, name: Option<&str>) {
    match name {
        Some(name) => check_text(v, name, "name", catalog.max_name_len()),
        None => v.add_error("name", "must be provided"),
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(EMAIL_RX.is_match(email), "email", "must be a valid email address");
}

pub fn validate_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_user(v: &mut Validator, input: &UserInput, creating: bool) {
    let required = |v: &mut Validator, present: bool, key: &str| {
        if creating && !present {
            v.add_error(key, "must be provided");
        }
    };

    required(v, input.email.is_some(), "email");
    required(v, input.first_name.is_some(), "first_name");
    required(v, input.last_name.is_some(), "last_name");
    required(v, input.password.is_some(), "password");

    if let Some(email) = &input.email {
        validate_email(v, email);
    }
    if let Some(first_name) = &input.first_name {
        check_text(v, first_name, "first_name", 500);
    }
    if let Some(last_name) = &input.last_name {
        check_text(v, last_name, "last_name", 500);
    }
    if let Some(password) = &input.password {
        validate_password(v, password);
    }
}

/// Validates a GeoJSON point feature. An empty object means "clear the feature".
pub fn validate_feature(v: &mut Validator, value: &Value) -> Option<FeatureChange> {
    let Some(object) = value.as_object() else {
        v.add_error("feature", "must be valid feature json");
        return None;
    };
    if object.is_empty() {
        return Some(FeatureChange::Clear);
    }

    v.check(
        object.get("type").and_then(Value::as_str) == Some("Feature"),
        "feat_type",
        "must be 'Feature' type",
    );

    let geometry = object.get("geometry").and_then(Value::as_object);
    v.check(
        geometry.and_then(|g| g.get("type")).and_then(Value::as_str) == Some("Point"),
        "geom_type",
        "must be 'Point' type",
    );

    let coordinates: Option<Vec<f64>> = geometry
        .and_then(|g| g.get("coordinates"))
        .and_then(Value::as_array)
        .and_then(|coords| coords.iter().map(Value::as_f64).collect());
    let point = match coordinates.as_deref() {
        Some([lng, lat]) => {
            v.check(
                (-180.0..=180.0).contains(lng),
                "geom_coords_lng",
                "longitude must be in between -180 and 180",
            );
            v.check(
                (-90.0..=90.0).contains(lat),
                "geom_coords_lat",
                "latitude must be in between -90 and 90",
            );
            Some([*lng, *lat])
        }
        _ => {
            v.add_error("geom_coords", "must be a lng, lat pair");
            None
        }
    };

    let properties = object.get("properties").and_then(Value::as_object);
    let non_empty = |key: &str| {
        properties
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    v.check(non_empty("name"), "props_name", "invalid or missing 'name' field");
    v.check(
        non_empty("full_address"),
        "props_full_addr",
        "invalid or missing 'full_address' field",
    );

    match (point, properties) {
        (Some(coordinates), Some(properties)) if v.valid() => Some(FeatureChange::Set(Feature {
            kind: "Feature".to_string(),
            geometry: Geometry {
                kind: "Point".to_string(),
                coordinates,
            },
            properties: properties.clone(),
        })),
        _ => None,
    }
}

fn validate_project_fields(v: &mut Validator, input: &ProjectInput) -> Option<FeatureChange> {
    let feature = input.feature.as_ref().and_then(|value| validate_feature(v, value));

    if let Some(project_id) = input.project_id {
        v.check(project_id > 0, "project_id", "must be a positive integer");
    }
    if let Some(proposal_id) = &input.proposal_id {
        check_text(v, proposal_id, "proposal_id", 10);
    }
    if let Some(name) = &input.name {
        check_text(v, name, "name", 500);
    }
    if let Some(status) = &input.status {
        check_text(v, status, "status", 100);
    }
    if let Some(note) = &input.note {
        v.check(note.len() <= 1000, "note", "must not be more than 1000 bytes long");
    }
    if let Some(client_names) = &input.client_names {
        v.check(is_unique(client_names), "client_names", "must not contain duplicate values");
    }
    if let Some(images) = &input.images {
        v.check(!images.is_empty(), "images", "must contain at least 1 image");
        v.check(is_unique(images), "images", "must not contain duplicate values");
    }
    if let Some(assignments) = &input.assignments {
        for assignment in assignments {
            v.check(assignment.employee_id.is_some(), "assignment employee_id", "must be provided");
            v.check(assignment.role_id.is_some(), "assignment role_id", "must be provided");
        }
    }

    feature
}

pub fn validate_new_project(v: &mut Validator, input: &ProjectInput) -> Option<FeatureChange> {
    v.check(input.project_id.is_some(), "project_id", "must be provided");
    v.check(input.proposal_id.is_some(), "proposal_id", "must be provided");
    v.check(input.name.is_some(), "name", "must be provided");
    v.check(input.status.is_some(), "status", "must be provided");
    v.check(input.client_names.is_some(), "client_names", "must be provided");
    if let Some(client_names) = &input.client_names {
        v.check(!client_names.is_empty(), "client_names", "must contain at least 1 client");
    }

    validate_project_fields(v, input)
}

/// Patch checks; an explicit empty `client_names` is allowed and clears the clients
pub fn validate_project_patch(v: &mut Validator, input: &ProjectInput) -> Option<FeatureChange> {
    validate_project_fields(v, input)
}

pub fn validate_project_query(v: &mut Validator, query: &ProjectQuery) -> Option<BoundingBox> {
    validate_filters(v, &query.filters());
    let bbox = query.bbox.as_deref().map(BoundingBox::parse);
    if let Some(parsed) = bbox {
        v.check(parsed.is_some(), "bbox", "must have 4 coordinates");
    }
    bbox.flatten()
}

fn check_work_date(v: &mut Validator, value: &str, key: &str) -> Option<NaiveDate> {
    let date = parse_date(value);
    v.check(date.is_some(), key, "must be a valid date in YYYY-MM-DD format");
    date
}

fn validate_timesheet_fields(v: &mut Validator, input: &TimesheetInput) -> Option<NaiveDate> {
    if let Some(user_id) = &input.user_id {
        v.check(user_id.len() == USER_ID_LEN, "user_id", "must be 8 bytes long");
    }
    if let Some(project_id) = input.project_id {
        v.check(project_id > 0, "project_id", "must be greater than zero");
    }
    if let Some(client_id) = input.client_id {
        v.check(client_id > 0, "client_id", "must be greater than zero");
    }
    if let Some(activity_id) = input.activity_id {
        v.check(activity_id > 0, "activity_id", "must be greater than zero");
    }
    if let Some(work_minutes) = input.work_minutes {
        v.check(
            (1..=MAX_DAILY_MINUTES).contains(&work_minutes),
            "work_mins",
            "must be between 1 and 1440",
        );
    }
    if let Some(description) = &input.description {
        v.check(
            description.len() <= 1000,
            "description",
            "must not be more than 1000 bytes long",
        );
    }

    input
        .work_date
        .as_deref()
        .and_then(|value| check_work_date(v, value, "work_date"))
}

pub fn validate_new_timesheet(v: &mut Validator, input: &TimesheetInput) -> Option<NaiveDate> {
    v.check(input.user_id.is_some(), "user_id", "must be provided");
    v.check(input.project_id.is_some(), "project_id", "must be provided");
    v.check(input.client_id.is_some(), "client_id", "must be provided");
    v.check(input.activity_id.is_some(), "activity_id", "must be provided");
    v.check(input.work_date.is_some(), "work_date", "must be provided");
    v.check(input.work_minutes.is_some(), "work_mins", "must be provided");

    validate_timesheet_fields(v, input)
}

pub fn validate_timesheet_patch(
    v: &mut Validator,
    input: &TimesheetInput,
) -> (Option<NaiveDate>, Option<TimesheetStatus>) {
    let work_date = validate_timesheet_fields(v, input);
    let status = input.status.as_deref().and_then(|value| {
        let parsed = value.parse::<TimesheetStatus>().ok();
        v.check(parsed.is_some(), "status", "must be a known timesheet status");
        parsed
    });
    (work_date, status)
}

pub fn validate_timesheet_query(v: &mut Validator, query: &TimesheetQuery) -> DateRange {
    validate_filters(v, &query.filters());

    let range = DateRange {
        on: query.work_date.as_deref().and_then(|d| check_work_date(v, d, "work_date")),
        from: query.from_date.as_deref().and_then(|d| check_work_date(v, d, "from_date")),
        to: query.to_date.as_deref().and_then(|d| check_work_date(v, d, "to_date")),
    };
    if let (Some(from), Some(to)) = (range.from, range.to) {
        v.check(from <= to, "from_date", "must not be after to_date");
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssignmentRequest;
    use serde_json::json;

    fn project_input() -> ProjectInput {
        ProjectInput {
            project_id: Some(24001),
            proposal_id: Some("P001-24".to_string()),
            name: Some("Harbor Bridge".to_string()),
            status: Some("active".to_string()),
            client_names: Some(vec!["Acme".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_error_per_field_wins() {
        let mut v = Validator::new();
        v.add_error("name", "must be provided");
        v.add_error("name", "must not be empty");
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("name"), Some("must be provided"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_new_project_requires_fields() {
        let mut v = Validator::new();
        validate_new_project(&mut v, &ProjectInput::default());
        let errors = v.finish().unwrap_err();
        for key in ["project_id", "proposal_id", "name", "status", "client_names"] {
            assert_eq!(errors.get(key), Some("must be provided"), "missing error for {}", key);
        }

        let mut v = Validator::new();
        validate_new_project(&mut v, &project_input());
        assert!(v.valid());
    }

    #[test]
    fn test_project_field_rules() {
        let mut input = project_input();
        input.project_id = Some(0);
        input.proposal_id = Some("P001-24-EXTRA".to_string());
        input.client_names = Some(vec!["Acme".to_string(), "Acme".to_string()]);
        input.images = Some(Vec::new());
        input.assignments = Some(vec![AssignmentRequest {
            employee_id: Some("abcd1234".to_string()),
            role_id: None,
        }]);

        let mut v = Validator::new();
        validate_new_project(&mut v, &input);
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("project_id"), Some("must be a positive integer"));
        assert_eq!(errors.get("proposal_id"), Some("must not be more than 10 bytes long"));
        assert_eq!(errors.get("client_names"), Some("must not contain duplicate values"));
        assert_eq!(errors.get("images"), Some("must contain at least 1 image"));
        assert_eq!(errors.get("assignment role_id"), Some("must be provided"));
    }

    #[test]
    fn test_patch_allows_empty_client_names() {
        let input = ProjectInput {
            client_names: Some(Vec::new()),
            ..Default::default()
        };
        let mut v = Validator::new();
        validate_project_patch(&mut v, &input);
        assert!(v.valid());

        let mut v = Validator::new();
        validate_new_project(
            &mut v,
            &ProjectInput {
                client_names: Some(Vec::new()),
                ..project_input()
            },
        );
        assert_eq!(v.finish().unwrap_err().get("client_names"), Some("must contain at least 1 client"));
    }

    #[test]
    fn test_feature_validation() {
        let mut v = Validator::new();
        let valid = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-79.38, 43.65] },
            "properties": { "name": "Harbor Bridge", "full_address": "1 Front St", "place_id": "x" }
        });
        match validate_feature(&mut v, &valid) {
            Some(FeatureChange::Set(feature)) => {
                assert_eq!(feature.longitude(), -79.38);
                assert_eq!(feature.property("place_id"), Some("x"));
            }
            other => panic!("expected a feature, got {:?}", other),
        }
        assert!(v.valid());

        let mut v = Validator::new();
        assert_eq!(validate_feature(&mut v, &json!({})), Some(FeatureChange::Clear));

        let mut v = Validator::new();
        let invalid = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [200.0, 43.65] },
            "properties": { "name": "" }
        });
        assert!(validate_feature(&mut v, &invalid).is_none());
        let errors = v.finish().unwrap_err();
        assert!(errors.get("geom_coords_lng").is_some());
        assert!(errors.get("props_name").is_some());
        assert!(errors.get("props_full_addr").is_some());

        let mut v = Validator::new();
        let bad_coords = json!({
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [1.0] },
            "properties": { "name": "a", "full_address": "b" }
        });
        assert!(validate_feature(&mut v, &bad_coords).is_none());
        let errors = v.finish().unwrap_err();
        assert!(errors.get("geom_type").is_some());
        assert!(errors.get("geom_coords").is_some());
    }

    #[test]
    fn test_user_validation() {
        let mut v = Validator::new();
        validate_user(
            &mut v,
            &UserInput {
                email: Some("not-an-email".to_string()),
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                password: Some("short".to_string()),
                ..Default::default()
            },
            true,
        );
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.get("email"), Some("must be a valid email address"));
        assert_eq!(errors.get("password"), Some("must be at least 8 bytes long"));

        let mut v = Validator::new();
        validate_email(&mut v, "jane.doe@example.co.uk");
        validate_password(&mut v, &"x".repeat(72));
        assert!(v.valid());

        let mut v = Validator::new();
        validate_password(&mut v, &"x".repeat(73));
        assert!(!v.valid());
    }

    #[test]
    fn test_catalog_name_lengths() {
        let mut v = Validator::new();
        validate_catalog_name(&mut v, Catalog::Role, Some("r".repeat(31).as_str()));
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_catalog_name(&mut v, Catalog::Activity, Some("a".repeat(31).as_str()));
        assert!(v.valid());
    }

    #[test]
    fn test_timesheet_validation() {
        let input = TimesheetInput {
            user_id: Some("abcd1234".to_string()),
            project_id: Some(24001),
            client_id: Some(1),
            activity_id: Some(1),
            work_date: Some("2024-03-15".to_string()),
            work_minutes: Some(90),
            description: Some("site visit".to_string()),
            ..Default::default()
        };
        let mut v = Validator::new();
        let work_date = validate_new_timesheet(&mut v, &input);
        assert!(v.valid());
        assert_eq!(work_date, parse_date("2024-03-15"));

        let mut v = Validator::new();
        validate_new_timesheet(
            &mut v,
            &TimesheetInput {
                user_id: Some("short".to_string()),
                work_date: Some("15-03-2024".to_string()),
                work_minutes: Some(1441),
                ..input.clone()
            },
        );
        let errors = v.finish().unwrap_err();
        assert!(errors.get("user_id").is_some());
        assert!(errors.get("work_date").is_some());
        assert!(errors.get("work_mins").is_some());

        let mut v = Validator::new();
        let (_, status) = validate_timesheet_patch(
            &mut v,
            &TimesheetInput {
                status: Some("approved".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(status, Some(TimesheetStatus::Approved));
        assert!(v.valid());
    }

    #[test]
    fn test_timesheet_query_date_order() {
        let mut v = Validator::new();
        validate_timesheet_query(
            &mut v,
            &TimesheetQuery {
                from_date: Some("2024-04-01".to_string()),
                to_date: Some("2024-03-01".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(v.finish().unwrap_err().get("from_date"), Some("must not be after to_date"));
    }

    #[test]
    fn test_filter_bounds() {
        let mut v = Validator::new();
        validate_filters(&mut v, &Filters::new(Some(0), Some(101), Some("bogus".to_string()), &["id"]));
        let errors = v.finish().unwrap_err();
        assert!(errors.get("page").is_some());
        assert!(errors.get("page_size").is_some());
        assert!(errors.get("sort").is_some());
    }
}
