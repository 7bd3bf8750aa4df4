//! # Map Provider
//!
//! Black-box access to the upstream mapping service: directions, time zones,
//! place search and street view. Every call is bounded by a timeout and every
//! upstream failure becomes a [`ProviderError`].
//!
//! ## Table of Contents
//! 1. ProviderError
//! 2. Wire types (places, street view, time zone)
//! 3. MapProvider trait
//! 4. HttpMapProvider - reqwest implementation
//! 5. Envelope parsing

use async_trait::async_trait;
use bytes::Bytes;
use mapspace_geo::LatLng;
use mapspace_world::route::{GmDirections, GmRoute};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;

// ============================================================================
// 1. ProviderError
// ============================================================================

/// Upstream mapping failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Map provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Map provider transport error: {0}")]
    Transport(String),

    #[error("Map provider error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("Map provider returned an unreadable payload: {0}")]
    Decode(String),

    #[error("Map provider is not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

// ============================================================================
// 2. Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmPlaceLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedText {
    pub text: String,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorAttribution {
    pub display_name: String,
    pub photo_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmPhoto {
    pub name: String,
    #[serde(default)]
    pub author_attributions: Vec<AuthorAttribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponent {
    pub short_text: String,
    pub long_text: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// One place from a text or nearby search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmPlace {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub formatted_address: String,
    pub location: GmPlaceLocation,
    pub display_name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_type_display_name: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<GmPhoto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_components: Option<Vec<AddressComponent>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GmPlaces {
    #[serde(default)]
    pub places: Vec<GmPlace>,
}

/// Circle restriction for a nearby search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCircle {
    pub radius: f64,
    pub center: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRestriction {
    pub circle: SearchCircle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchNearParam {
    pub max_result_count: u32,
    pub language_code: String,
    pub location_restriction: LocationRestriction,
}

/// Street view image / metadata request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetViewParam {
    /// `"{width}x{height}"`
    pub size: String,
    /// `"lat,lng"` or an address
    pub location: String,
    pub fov: f64,
    pub heading: f64,
    pub pitch: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetViewMetadata {
    /// 200 when imagery exists at the location, 404 when it does not
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneInfo {
    pub status: String,
    pub time_zone_id: Option<String>,
}

// ============================================================================
// 3. MapProvider trait
// ============================================================================

/// Upstream mapping service.
#[async_trait]
pub trait MapProvider: Send + Sync {
    /// Candidate routes; empty when the provider found none
    async fn directions(&self, origin: &str, destination: &str, mode: &str) -> ProviderResult<Vec<GmRoute>>;

    async fn timezone(&self, location: LatLng, timestamp: i64) -> ProviderResult<TimezoneInfo>;

    async fn search_text(&self, query: &str) -> ProviderResult<Vec<GmPlace>>;

    async fn search_nearby(&self, params: &SearchNearParam) -> ProviderResult<Vec<GmPlace>>;

    async fn streetview_metadata(&self, params: &StreetViewParam) -> ProviderResult<StreetViewMetadata>;

    async fn streetview_image(&self, params: &StreetViewParam) -> ProviderResult<Bytes>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// 4. HttpMapProvider
// ============================================================================

const PLACES_FIELD_MASK: &str = "places.id,places.types,places.formattedAddress,places.location,\
places.displayName,places.primaryTypeDisplayName,places.primaryType,places.photos,places.addressComponents";

/// Map provider backed by the public HTTP APIs.
pub struct HttpMapProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpMapProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn key(&self) -> ProviderResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("MAPS_API_KEY is not set".into()))
    }

    fn maps_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.maps_base_url.trim_end_matches('/'), path)
    }

    fn places_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.places_base_url.trim_end_matches('/'), path)
    }

    /// Send with an outer deadline so a stalled body read cannot hang the caller.
    async fn fetch(&self, request: reqwest::RequestBuilder) -> ProviderResult<(u16, Bytes)> {
        let deadline = self.config.timeout();
        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, ProviderError>((status, body))
        };
        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(deadline)),
        }
    }

    async fn fetch_json(&self, request: reqwest::RequestBuilder) -> ProviderResult<Value> {
        let (status, body) = self.fetch(request).await?;
        let value: Value = if body.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(&body)?
        };
        check_envelope(&value)?;
        if status >= 400 {
            return Err(ProviderError::Upstream {
                code: i64::from(status),
                message: format!("HTTP {}", status),
            });
        }
        Ok(value)
    }

    fn streetview_query(&self, params: &StreetViewParam, key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("size", params.size.clone()),
            ("location", params.location.clone()),
            ("fov", params.fov.to_string()),
            ("heading", params.heading.to_string()),
            ("pitch", params.pitch.to_string()),
            ("key", key.to_string()),
        ]
    }

    async fn places(&self, path: &str, body: Value) -> ProviderResult<Vec<GmPlace>> {
        let key = self.key()?;
        let request = self
            .client
            .post(self.places_url(path))
            .header("X-Goog-Api-Key", key)
            .header("X-Goog-FieldMask", PLACES_FIELD_MASK)
            .json(&body);
        let value = self.fetch_json(request).await?;
        let places: GmPlaces = serde_json::from_value(value)?;
        Ok(places.places)
    }
}

#[async_trait]
impl MapProvider for HttpMapProvider {
    async fn directions(&self, origin: &str, destination: &str, mode: &str) -> ProviderResult<Vec<GmRoute>> {
        let key = self.key()?;
        let request = self.client.get(self.maps_url("directions/json")).query(&[
            ("origin", origin),
            ("destination", destination),
            ("mode", mode),
            ("key", key),
        ]);
        let value = self.fetch_json(request).await?;
        parse_directions(value)
    }

    async fn timezone(&self, location: LatLng, timestamp: i64) -> ProviderResult<TimezoneInfo> {
        let key = self.key()?;
        let request = self.client.get(self.maps_url("timezone/json")).query(&[
            ("location", location.to_query_string()),
            ("timestamp", timestamp.to_string()),
            ("key", key.to_string()),
        ]);
        let value = self.fetch_json(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn search_text(&self, query: &str) -> ProviderResult<Vec<GmPlace>> {
        let body = serde_json::json!({
            "textQuery": query,
            "languageCode": self.config.language_code,
        });
        self.places("places:searchText", body).await
    }

    async fn search_nearby(&self, params: &SearchNearParam) -> ProviderResult<Vec<GmPlace>> {
        let circle = &params.location_restriction.circle;
        let body = serde_json::json!({
            "maxResultCount": params.max_result_count,
            "languageCode": params.language_code,
            "locationRestriction": {
                "circle": {
                    "center": { "latitude": circle.center.lat, "longitude": circle.center.lng },
                    "radius": circle.radius,
                }
            }
        });
        self.places("places:searchNearby", body).await
    }

    async fn streetview_metadata(&self, params: &StreetViewParam) -> ProviderResult<StreetViewMetadata> {
        let key = self.key()?;
        let request = self
            .client
            .get(self.maps_url("streetview/metadata"))
            .query(&self.streetview_query(params, key));
        let value = self.fetch_json(request).await?;
        let status = value.get("status").and_then(Value::as_str).unwrap_or_default();
        Ok(StreetViewMetadata {
            status: match status {
                "OK" => 200,
                "ZERO_RESULTS" | "NOT_FOUND" => 404,
                _ => 500,
            },
        })
    }

    async fn streetview_image(&self, params: &StreetViewParam) -> ProviderResult<Bytes> {
        let key = self.key()?;
        let mut query = self.streetview_query(params, key);
        query.push(("return_error_code", "true".to_string()));
        let request = self.client.get(self.maps_url("streetview")).query(&query);
        let (status, body) = self.fetch(request).await?;
        if status >= 400 {
            return Err(ProviderError::Upstream {
                code: i64::from(status),
                message: "street view image unavailable".into(),
            });
        }
        Ok(body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// 5. Envelope parsing
// ============================================================================

/// `{"error": {code, message, status}}` becomes `Upstream`.
pub fn check_envelope(value: &Value) -> ProviderResult<()> {
    let Some(error) = value.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Err(ProviderError::Upstream { code, message })
}

/// Directions body to routes. A non-OK status without routes is an empty
/// result, an empty object likewise.
pub fn parse_directions(value: Value) -> ProviderResult<Vec<GmRoute>> {
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(Vec::new());
    }
    let directions: GmDirections = serde_json::from_value(value)?;
    if directions.status != "OK" && directions.routes.is_empty() {
        tracing::warn!(status = %directions.status, "Directions returned no routes");
    }
    Ok(directions.routes)
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub mod scripted {
    //! Provider double that replays canned answers and records calls.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct ScriptedProvider {
        pub routes: Vec<GmRoute>,
        pub places: Vec<GmPlace>,
        pub failure: Option<ProviderError>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn record(&self, call: String) -> ProviderResult<()> {
            self.calls.lock().push(call);
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl MapProvider for ScriptedProvider {
        async fn directions(&self, origin: &str, destination: &str, mode: &str) -> ProviderResult<Vec<GmRoute>> {
            self.record(format!("directions {} -> {} ({})", origin, destination, mode))?;
            Ok(self.routes.clone())
        }

        async fn timezone(&self, location: LatLng, _timestamp: i64) -> ProviderResult<TimezoneInfo> {
            self.record(format!("timezone {}", location.to_query_string()))?;
            Ok(TimezoneInfo {
                status: "OK".into(),
                time_zone_id: Some("Asia/Tokyo".into()),
            })
        }

        async fn search_text(&self, query: &str) -> ProviderResult<Vec<GmPlace>> {
            self.record(format!("search_text {}", query))?;
            Ok(self.places.clone())
        }

        async fn search_nearby(&self, params: &SearchNearParam) -> ProviderResult<Vec<GmPlace>> {
            self.record(format!("search_nearby {}", params.location_restriction.circle.radius))?;
            Ok(self.places.clone())
        }

        async fn streetview_metadata(&self, params: &StreetViewParam) -> ProviderResult<StreetViewMetadata> {
            self.record(format!("metadata {}", params.location))?;
            Ok(StreetViewMetadata { status: 200 })
        }

        async fn streetview_image(&self, params: &StreetViewParam) -> ProviderResult<Bytes> {
            self.record(format!("streetview {}", params.location))?;
            Ok(Bytes::from_static(b"\xFF\xD8\xFF"))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
