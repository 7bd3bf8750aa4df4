//! # MapSpace Wire Protocol
//!
//! Request and response bodies for the HTTP surface. Field names are
//! camelCase on the wire; statuses are the closed string enums of
//! [`mapspace_world::status`].
//!
//! ## Table of Contents
//! 1. View queries
//! 2. Target and mutation requests
//! 3. Route requests
//! 4. Maps passthrough
//! 5. Error envelope

use mapspace_geo::{LatLng, Pose};
use mapspace_world::graph::ChangePatch;
use mapspace_world::prelude::{Entity, MoveRequest, PlaceObject, RegionMap, RelayPoint, ViewInfo, ViewRecord};
use mapspace_world::route::GmRoute;
use serde::{Deserialize, Serialize};

use crate::provider::GmPlace;

/// Status of the read-only view endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    Ok,
    Error,
}

// ============================================================================
// 1. View queries
// ============================================================================

/// `?userId=&lat=&lng=&bearing=`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bearing: f64,
}

impl ViewQuery {
    pub fn pose(&self) -> Pose {
        Pose::new(self.lat, self.lng, self.bearing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewPromptResponse {
    pub status: ViewStatus,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewPointResponse {
    pub status: ViewStatus,
    pub points: Vec<ViewRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInfoResponse {
    pub status: ViewStatus,
    #[serde(flatten)]
    pub info: ViewInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMapResponse {
    pub status: ViewStatus,
    #[serde(flatten)]
    pub map: RegionMap,
}

// ============================================================================
// 2. Target and mutation requests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTargetRequest {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bearing: f64,
    pub target_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Pose fields are optional: without them the avatar's route position is
/// the observer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToTargetRequest {
    pub user_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub bearing: Option<f64>,
    pub proceed: f64,
    pub target_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl MoveToTargetRequest {
    pub fn into_move(self) -> MoveRequest {
        let pose = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Pose::new(lat, lng, self.bearing.unwrap_or_default())),
            _ => None,
        };
        MoveRequest {
            pose,
            proceed: self.proceed,
            target_id: self.target_id,
            targets: self.targets,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddObjectRequest {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bearing: f64,
    pub type_name: String,
    pub unique_name: Option<String>,
    #[serde(default)]
    pub desc: String,
    pub radius: Option<f64>,
    pub nearby_target_id: Option<String>,
    #[serde(default)]
    pub nearby_targets: Vec<String>,
    pub expiration_epoch: Option<i64>,
    pub position: Option<String>,
}

impl AddObjectRequest {
    pub fn into_place(self) -> PlaceObject {
        PlaceObject {
            pose: Some(Pose::new(self.lat, self.lng, self.bearing)),
            type_name: self.type_name,
            unique_name: self.unique_name,
            desc: self.desc,
            radius: self.radius,
            nearby_target_id: self.nearby_target_id,
            nearby_targets: self.nearby_targets,
            expiration_epoch: self.expiration_epoch,
            position: self.position,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveObjectRequest {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bearing: f64,
    pub target_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeObjectRequest {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bearing: f64,
    pub target_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    pub desc: Option<String>,
    pub type_name: Option<String>,
    pub unique_name: Option<String>,
    pub parent_region_id: Option<String>,
}

impl ChangeObjectRequest {
    pub fn patch(&self) -> ChangePatch {
        ChangePatch {
            desc: self.desc.clone(),
            type_name: self.type_name.clone(),
            unique_name: self.unique_name.clone(),
            parent_region_id: self.parent_region_id.clone(),
        }
    }
}

// ============================================================================
// 3. Route requests
// ============================================================================

fn default_mode() -> String {
    "walking".to_string()
}

/// One leg of a requested route, in travel order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteSegment {
    /// Fetched from the provider; the first returned route is used
    Directions {
        origin: String,
        destination: String,
        #[serde(default = "default_mode")]
        mode: String,
    },
    /// A hand-placed waypoint joined to the previous segment by a straight line
    Relay(RelayPoint),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub user_id: String,
    pub segments: Vec<RouteSegment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

// ============================================================================
// 4. Maps passthrough
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsQuery {
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub status: String,
    pub routes: Vec<GmRoute>,
}

/// `timestamp` defaults to now.
#[derive(Debug, Clone, Deserialize)]
pub struct TimezoneQuery {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: Option<i64>,
}

impl TimezoneQuery {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTextRequest {
    pub text_query: String,
    /// When set, the user's world objects matching the query are included
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchTextResponse {
    pub places: Vec<GmPlace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<Entity>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchNearbyResponse {
    pub places: Vec<GmPlace>,
}

fn default_fov() -> f64 {
    90.0
}

fn default_size() -> u32 {
    640
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreetViewQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default = "default_fov")]
    pub fov: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
}

impl StreetViewQuery {
    pub fn to_param(&self) -> crate::provider::StreetViewParam {
        crate::provider::StreetViewParam {
            size: format!("{}x{}", self.width, self.height),
            location: LatLng::new(self.lat, self.lng).to_query_string(),
            fov: self.fov,
            heading: self.heading,
            pitch: self.pitch,
        }
    }
}

// ============================================================================
// 5. Error envelope
// ============================================================================

/// Upstream-style error body returned by the maps passthrough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
    pub status: String,
}

impl From<&crate::provider::ProviderError> for ErrorEnvelope {
    fn from(err: &crate::provider::ProviderError) -> Self {
        use crate::provider::ProviderError;
        let (code, status) = match err {
            ProviderError::Timeout(_) => (504, "DEADLINE_EXCEEDED"),
            ProviderError::Transport(_) => (503, "UNAVAILABLE"),
            ProviderError::Upstream { code, .. } => (*code, "UPSTREAM_ERROR"),
            ProviderError::Decode(_) => (502, "INVALID_RESPONSE"),
            ProviderError::NotConfigured(_) => (500, "NOT_CONFIGURED"),
        };
        Self {
            error: ErrorBody {
                code,
                message: err.to_string(),
                status: status.to_string(),
            },
        }
    }
}
