use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{AssignmentMember, AssignmentRequest, Filters, SerialId, Timestamp};

/// GeoJSON point geometry, coordinates as `[longitude, latitude]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

/// GeoJSON feature locating a project site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn point(longitude: f64, latitude: f64, name: &str, full_address: &str) -> Self {
        let mut properties = Map::new();
        properties.insert("name".to_string(), Value::String(name.to_string()));
        properties.insert("full_address".to_string(), Value::String(full_address.to_string()));

        Self {
            kind: "Feature".to_string(),
            geometry: Geometry {
                kind: "Point".to_string(),
                coordinates: [longitude, latitude],
            },
            properties,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn full_address(&self) -> Option<&str> {
        self.property("full_address")
    }
}

/// Outcome of a validated `feature` field in a request body
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureChange {
    Clear,
    Set(Feature),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Parse `minLng,minLat,maxLng,maxLat`
    pub fn parse(value: &str) -> Option<Self> {
        let coords: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;

        match coords.as_slice() {
            [min_lng, min_lat, max_lng, max_lat] => Some(Self {
                min_lng: *min_lng,
                min_lat: *min_lat,
                max_lng: *max_lng,
                max_lat: *max_lat,
            }),
            _ => None,
        }
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        let (lng, lat) = (feature.longitude(), feature.latitude());
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Columns of the project row written by inserts and version-guarded updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFields {
    pub project_id: SerialId,
    pub proposal_id: String,
    pub name: String,
    pub status: String,
    pub feature: Option<Feature>,
    pub note: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectClient {
    pub id: SerialId,
    pub name: String,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAssignment {
    pub employee_id: String,
    pub employee_email: String,
    pub role_id: SerialId,
    pub role_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(skip)]
    pub internal_id: SerialId,
    #[serde(flatten)]
    pub fields: ProjectFields,
    pub clients: Vec<ProjectClient>,
    pub assignments: Vec<ProjectAssignment>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn assignment_members(&self) -> Vec<AssignmentMember> {
        self.assignments
            .iter()
            .map(|a| AssignmentMember::new(a.employee_id.clone(), a.role_id))
            .collect()
    }

    /// Current fields with the supplied parts of a patch applied
    pub fn merged_fields(&self, input: &ProjectInput, feature: Option<FeatureChange>) -> ProjectFields {
        let mut fields = self.fields.clone();
        if let Some(project_id) = input.project_id {
            fields.project_id = project_id;
        }
        if let Some(proposal_id) = &input.proposal_id {
            fields.proposal_id = proposal_id.clone();
        }
        if let Some(name) = &input.name {
            fields.name = name.clone();
        }
        if let Some(status) = &input.status {
            fields.status = status.clone();
        }
        if let Some(note) = &input.note {
            fields.note = Some(note.clone());
        }
        if let Some(images) = &input.images {
            fields.images = images.clone();
        }
        match feature {
            Some(FeatureChange::Clear) => fields.feature = None,
            Some(FeatureChange::Set(feature)) => fields.feature = Some(feature),
            None => {}
        }
        fields
    }
}

/// Request body for creating or patching a project.
///
/// `client_names` and `assignments` distinguish an omitted field (`None`, leave the
/// association untouched) from an explicit empty list (clear it).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectInput {
    pub project_id: Option<SerialId>,
    pub proposal_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub feature: Option<Value>,
    pub note: Option<String>,
    pub images: Option<Vec<String>>,
    pub client_names: Option<Vec<String>>,
    pub assignments: Option<Vec<AssignmentRequest>>,
    pub version: Option<i32>,
}

impl ProjectInput {
    pub fn assignment_members(&self) -> Option<Vec<AssignmentMember>> {
        self.assignments
            .as_ref()
            .map(|requests| requests.iter().filter_map(AssignmentRequest::to_member).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub fields: ProjectFields,
    pub client_ids: Vec<SerialId>,
    pub assignments: Vec<AssignmentMember>,
}

/// Desired state handed to the update orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectChanges {
    pub fields: ProjectFields,
    pub client_ids: Option<Vec<SerialId>>,
    pub assignments: Option<Vec<AssignmentMember>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectQuery {
    pub name: Option<String>,
    pub status: Option<String>,
    pub project_id: Option<String>,
    pub proposal_id: Option<String>,
    pub full_address: Option<String>,
    pub client_name: Option<String>,
    pub bbox: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

impl ProjectQuery {
    pub const SORT_SAFELIST: [&'static str; 3] = ["project_id", "name", "status"];

    pub fn filters(&self) -> Filters {
        Filters::new(self.page, self.page_size, self.sort.clone(), &Self::SORT_SAFELIST)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox.as_deref().and_then(BoundingBox::parse)
    }

    pub fn has_filters(&self) -> bool {
        self.name.is_some()
            || self.status.is_some()
            || self.project_id.is_some()
            || self.proposal_id.is_some()
            || self.full_address.is_some()
            || self.client_name.is_some()
            || self.bbox.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_project() -> Project {
        Project {
            internal_id: 1,
            fields: ProjectFields {
                project_id: 24001,
                proposal_id: "P001-24".to_string(),
                name: "Harbor Bridge".to_string(),
                status: "active".to_string(),
                feature: Some(Feature::point(-79.38, 43.65, "Harbor Bridge", "1 Front St, Toronto")),
                note: None,
                images: vec!["a.png".to_string()],
            },
            clients: Vec::new(),
            assignments: Vec::new(),
            version: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_project_serializes_flat_without_internal_id() {
        let json = serde_json::to_value(sample_project()).unwrap();
        assert_eq!(json["project_id"], 24001);
        assert_eq!(json["proposal_id"], "P001-24");
        assert_eq!(json["feature"]["geometry"]["coordinates"], json!([-79.38, 43.65]));
        assert!(json.get("internal_id").is_none());
        assert!(json.get("fields").is_none());
    }

    #[test]
    fn test_merged_fields_only_touches_supplied_values() {
        let project = sample_project();
        let input = ProjectInput {
            name: Some("Harbor Bridge Phase 2".to_string()),
            ..Default::default()
        };

        let merged = project.merged_fields(&input, None);
        assert_eq!(merged.name, "Harbor Bridge Phase 2");
        assert_eq!(merged.proposal_id, "P001-24");
        assert!(merged.feature.is_some());

        let cleared = project.merged_fields(&ProjectInput::default(), Some(FeatureChange::Clear));
        assert!(cleared.feature.is_none());
    }

    #[test]
    fn test_omitted_and_empty_client_names_differ() {
        let omitted: ProjectInput = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert!(omitted.client_names.is_none());

        let empty: ProjectInput = serde_json::from_value(json!({ "client_names": [] })).unwrap();
        assert_eq!(empty.client_names, Some(Vec::new()));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::parse("-80,43,-79,44").unwrap();
        assert!(bbox.contains(&Feature::point(-79.38, 43.65, "a", "b")));
        assert!(!bbox.contains(&Feature::point(2.35, 48.85, "a", "b")));

        assert!(BoundingBox::parse("1,2,3").is_none());
        assert!(BoundingBox::parse("a,b,c,d").is_none());
    }
}
