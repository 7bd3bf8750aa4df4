//! HTTP handlers for the MapSpace endpoints.
//!
//! World locks are synchronous; every provider call finishes before a lock
//! is taken.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mapspace_world::prelude::*;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{ServiceError, ServiceResult},
    protocol::*,
    provider::{ProviderError, SearchNearParam, TimezoneInfo},
    server::AppState,
};

// ============================================================================
// Views
// ============================================================================

/// GET /view-prompt - Natural-language description of the view
pub async fn view_prompt(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Json<ViewPromptResponse> {
    tracing::debug!(user_id = %query.user_id, lat = query.lat, lng = query.lng, bearing = query.bearing, "View prompt");
    let pose = query.pose();
    let prompt = state
        .store
        .read(&query.user_id, |world| world.view_prompt(&pose, state.language));
    Json(ViewPromptResponse {
        status: ViewStatus::Ok,
        prompt,
    })
}

/// GET /view-point - Every visible entity with camera-relative placement
pub async fn view_point(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Json<ViewPointResponse> {
    let pose = query.pose();
    let points = state.store.read(&query.user_id, |world| world.view_points(&pose));
    tracing::debug!(user_id = %query.user_id, visible = points.len(), "View points");
    Json(ViewPointResponse {
        status: ViewStatus::Ok,
        points,
    })
}

/// GET /view-info - Visible regions and objects
pub async fn view_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Json<ViewInfoResponse> {
    let pose = query.pose();
    let info = state.store.read(&query.user_id, |world| world.view_info(&pose));
    Json(ViewInfoResponse {
        status: ViewStatus::Ok,
        info,
    })
}

/// GET /region-map - Surroundings relative to the current region
pub async fn region_map(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Json<RegionMapResponse> {
    let pose = query.pose();
    let map = state.store.read(&query.user_id, |world| world.region_map(&pose));
    Json(RegionMapResponse {
        status: ViewStatus::Ok,
        map,
    })
}

// ============================================================================
// Targets and mutations
// ============================================================================

/// POST /check-target - Does the named target exist nearby
pub async fn check_target(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckTargetRequest>,
) -> Json<CheckReply> {
    let pose = Pose::new(request.lat, request.lng, request.bearing);
    let reply = state.store.read(&request.user_id, |world| {
        world.check_target(&pose, request.target_id.as_deref(), &request.targets)
    });
    tracing::info!(
        user_id = %request.user_id,
        targets = ?request.targets,
        status = ?reply.status,
        "Checked target"
    );
    Json(reply)
}

/// POST /move-to-target - Move toward a target or along the loaded route
pub async fn move_to_target(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MoveToTargetRequest>,
) -> Json<MoveReply> {
    let user_id = request.user_id.clone();
    let request = request.into_move();
    let reply = state.store.write(&user_id, |world| world.move_to_target(&request));
    tracing::info!(
        user_id = %user_id,
        proceed = request.proceed,
        status = ?reply.status,
        "Moved avatar"
    );
    Json(reply)
}

/// POST /add-object - Place a new object near the observer
pub async fn add_object(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddObjectRequest>,
) -> Json<AddReply> {
    let user_id = request.user_id.clone();
    let type_name = request.type_name.clone();
    let reply = state.store.write(&user_id, |world| world.add_object(request.into_place()));
    tracing::info!(
        user_id = %user_id,
        type_name = %type_name,
        status = ?reply.status,
        object_id = ?reply.object_id,
        "Added object"
    );
    Json(reply)
}

/// POST /remove-object - Remove a uniquely named entity
pub async fn remove_object(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RemoveObjectRequest>,
) -> Json<MutationReply> {
    let pose = Pose::new(request.lat, request.lng, request.bearing);
    let reply = state.store.write(&request.user_id, |world| {
        world.remove_object(&pose, request.target_id.as_deref(), &request.targets)
    });
    tracing::info!(
        user_id = %request.user_id,
        target_id = ?request.target_id,
        status = ?reply.status,
        "Removed object"
    );
    Json(reply)
}

/// POST /change-object - Rewrite fields of the nearest match
pub async fn change_object(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChangeObjectRequest>,
) -> Json<MutationReply> {
    let pose = Pose::new(request.lat, request.lng, request.bearing);
    let patch = request.patch();
    let reply = state.store.write(&request.user_id, |world| {
        world.change_object(&pose, request.target_id.as_deref(), &request.targets, &patch)
    });
    tracing::info!(
        user_id = %request.user_id,
        target_id = ?request.target_id,
        status = ?reply.status,
        "Changed object"
    );
    Json(reply)
}

// ============================================================================
// Route
// ============================================================================

/// POST /route - Fetch directions for each segment and load the joined path
pub async fn load_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> ServiceResult<Json<RouteProgress>> {
    if request.segments.is_empty() {
        return Err(ServiceError::InvalidRequest("segments must not be empty".into()));
    }

    let mut sources = Vec::with_capacity(request.segments.len());
    for segment in request.segments {
        match segment {
            RouteSegment::Directions { origin, destination, mode } => {
                let routes = state.provider.directions(&origin, &destination, &mode).await?;
                let Some(route) = routes.into_iter().next() else {
                    return Err(ServiceError::InvalidRequest(format!(
                        "no route from {} to {}",
                        origin, destination
                    )));
                };
                sources.push(RouteSource::Directions(route));
            }
            RouteSegment::Relay(point) => sources.push(RouteSource::Relay(point)),
        }
    }

    let progress = state
        .store
        .write(&request.user_id, |world| world.load_route(sources))?;
    tracing::info!(
        user_id = %request.user_id,
        steps = progress.steps.len(),
        total_length = progress.total_length,
        "Loaded route"
    );
    Ok(Json(progress))
}

/// GET /route - Current progress and the flattened steps
pub async fn route_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Json<RouteProgress> {
    Json(state.store.read(&query.user_id, |world| world.route_progress()))
}

/// POST /route/reset - Drop the loaded route
pub async fn reset_route(
    State(state): State<Arc<AppState>>,
    Json(query): Json<UserQuery>,
) -> Json<RouteProgress> {
    let progress = state.store.write(&query.user_id, |world| {
        world.reset_route();
        world.route_progress()
    });
    tracing::info!(user_id = %query.user_id, "Reset route");
    Json(progress)
}

// ============================================================================
// Maps passthrough
// ============================================================================

fn envelope(err: &ProviderError) -> Response {
    tracing::warn!(error = %err, "Map provider call failed");
    Json(ErrorEnvelope::from(err)).into_response()
}

/// GET /maps/directions
pub async fn directions(State(state): State<Arc<AppState>>, Query(query): Query<DirectionsQuery>) -> Response {
    match state
        .provider
        .directions(&query.origin, &query.destination, &query.mode)
        .await
    {
        Ok(routes) => Json(DirectionsResponse {
            status: if routes.is_empty() { "ZERO_RESULTS" } else { "OK" }.to_string(),
            routes,
        })
        .into_response(),
        Err(err) => envelope(&err),
    }
}

/// GET /maps/timezone
pub async fn timezone(State(state): State<Arc<AppState>>, Query(query): Query<TimezoneQuery>) -> Json<TimezoneInfo> {
    let timestamp = query.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    match state.provider.timezone(query.location(), timestamp).await {
        Ok(info) => Json(info),
        Err(err) => {
            tracing::warn!(error = %err, "Time zone lookup failed");
            Json(TimezoneInfo {
                status: "error".to_string(),
                time_zone_id: None,
            })
        }
    }
}

/// POST /maps/search-text - Places plus the user's matching world objects
pub async fn search_text(State(state): State<Arc<AppState>>, Json(request): Json<SearchTextRequest>) -> Response {
    let places = match state.provider.search_text(&request.text_query).await {
        Ok(places) => places,
        Err(err) => return envelope(&err),
    };
    let objects = request
        .user_id
        .as_deref()
        .map(|user| state.store.read(user, |world| world.search_objects(&request.text_query)));
    Json(SearchTextResponse { places, objects }).into_response()
}

/// POST /maps/search-nearby
pub async fn search_nearby(State(state): State<Arc<AppState>>, Json(params): Json<SearchNearParam>) -> Response {
    match state.provider.search_nearby(&params).await {
        Ok(places) => Json(SearchNearbyResponse { places }).into_response(),
        Err(err) => envelope(&err),
    }
}

/// GET /maps/metadata - `{status: 200}` when street view imagery exists
pub async fn streetview_metadata(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreetViewQuery>,
) -> Response {
    match state.provider.streetview_metadata(&query.to_param()).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(err) => envelope(&err),
    }
}

/// GET /maps/streetview - JPEG bytes
pub async fn streetview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreetViewQuery>,
) -> ServiceResult<Response> {
    let image = state.provider.streetview_image(&query.to_param()).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image).into_response())
}

// ============================================================================
// Health
// ============================================================================

/// GET /health - Health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "users": state.store.user_count(),
            "provider": state.provider.name(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
