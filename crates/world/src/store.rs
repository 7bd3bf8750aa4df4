//! # Per-User World Store
//!
//! Every user owns one [`UserWorld`]: their graph, their route progress and
//! the view policy. [`WorldStore`] hands out synchronous per-user locks;
//! mutations are serialized per user and readers see whole snapshots.
//!
//! ## Table of Contents
//! 1. Replies - status + answer pairs returned by every operation
//! 2. UserWorld - view queries, target and mutation operations, routes
//! 3. WorldStore - per-user locking

use glam::DVec2;
use mapspace_geo::{frame_to_enu, offset_latlng, rotate_to_frame, to_local, LatLng, Pose};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::describe::{view_prompt, Language};
use crate::error::{Result, WorldError};
use crate::graph::{
    ChangePatch, Entity, NewEntity, NewObject, NewRegion, Offset3, WorldGraph, DEFAULT_REGION_RADIUS,
};
use crate::route::{DirectionStep, RouteSource, RouteTracker, TrackerState};
use crate::status::{AddRemoveStatus, LocStatus, MoveStatus};
use crate::target::{MoveRequest, TargetResolver};
use crate::view::{RegionMap, ViewInfo, ViewPolicy, ViewProjector, ViewRecord};

/// Meters a `position` word shifts a new object from its anchor.
const PLACEMENT_STEP: f64 = 1.0;

// ============================================================================
// 1. Replies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReply {
    pub status: LocStatus,
    pub answer: String,
    pub target_name: Option<String>,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReply {
    pub status: MoveStatus,
    pub answer: String,
    pub loc: Option<Pose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReply {
    pub status: AddRemoveStatus,
    pub answer: String,
    pub object_id: Option<String>,
    pub region_id: Option<String>,
}

impl AddReply {
    fn failed(status: AddRemoveStatus, answer: impl Into<String>) -> Self {
        Self {
            status,
            answer: answer.into(),
            object_id: None,
            region_id: None,
        }
    }
}

/// Reply for remove and change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationReply {
    pub status: AddRemoveStatus,
    pub answer: String,
}

impl MutationReply {
    fn new(status: AddRemoveStatus, answer: impl Into<String>) -> Self {
        Self {
            status,
            answer: answer.into(),
        }
    }
}

/// Snapshot of the route cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    pub state: TrackerState,
    pub offset: f64,
    pub total_length: f64,
    pub pose: Option<Pose>,
    pub steps: Vec<DirectionStep>,
}

/// Request to place a new object near the observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceObject {
    pub pose: Option<Pose>,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub desc: String,
    pub radius: Option<f64>,
    pub nearby_target_id: Option<String>,
    #[serde(default)]
    pub nearby_targets: Vec<String>,
    pub expiration_epoch: Option<i64>,
    /// Direction word relative to the observer (`front`, `left`, `above`, ...)
    pub position: Option<String>,
}

/// Camera-frame unit shift (right, forward, up) for a direction word.
fn placement_shift(word: Option<&str>) -> (DVec2, f64) {
    let Some(word) = word else {
        return (DVec2::ZERO, 0.0);
    };
    let mut planar = DVec2::ZERO;
    let mut up: f64 = 0.0;
    for token in word.to_lowercase().split(|c: char| !c.is_alphabetic()) {
        match token {
            "front" | "ahead" | "forward" => planar.y += 1.0,
            "back" | "behind" | "rear" => planar.y -= 1.0,
            "left" => planar.x -= 1.0,
            "right" => planar.x += 1.0,
            "above" | "upper" | "up" | "over" | "on" => up += 1.0,
            "below" | "lower" | "down" | "under" => up -= 1.0,
            _ => {}
        }
    }
    (planar.normalize_or_zero() * PLACEMENT_STEP, up.clamp(-1.0, 1.0) * PLACEMENT_STEP)
}

// ============================================================================
// 2. UserWorld
// ============================================================================

/// One user's graph, route cursor and view policy.
pub struct UserWorld {
    pub graph: WorldGraph,
    pub tracker: RouteTracker,
    pub policy: ViewPolicy,
}

impl UserWorld {
    pub fn new(policy: ViewPolicy) -> Self {
        Self {
            graph: WorldGraph::new(),
            tracker: RouteTracker::new(),
            policy,
        }
    }

    fn projector(&self) -> ViewProjector<'_> {
        ViewProjector::new(&self.graph, &self.policy)
    }

    fn resolver(&self) -> TargetResolver<'_> {
        TargetResolver::new(&self.graph, &self.policy)
    }

    fn has_expired(&self, now: i64) -> bool {
        self.graph.iter().any(|e| match e {
            Entity::Object(o) => o.expiration_epoch.is_some_and(|t| t < now),
            Entity::Region(_) => false,
        })
    }

    // --- views --------------------------------------------------------------

    pub fn view_points(&self, pose: &Pose) -> Vec<ViewRecord> {
        self.projector().view(pose)
    }

    pub fn view_info(&self, pose: &Pose) -> ViewInfo {
        self.projector().view_info(pose)
    }

    pub fn region_map(&self, pose: &Pose) -> RegionMap {
        self.projector().region_map(pose)
    }

    pub fn view_prompt(&self, pose: &Pose, lang: Language) -> String {
        let records = self.view_points(pose);
        view_prompt(self.graph.region_at(pose.location()), &records, lang)
    }

    // --- targets ------------------------------------------------------------

    pub fn check_target(&self, pose: &Pose, target_id: Option<&str>, targets: &[String]) -> CheckReply {
        let outcome = self.resolver().check_target(pose, target_id, targets);
        let wanted = match target_id {
            Some(id) if targets.is_empty() => id.to_string(),
            _ => targets.join(" / "),
        };
        let answer = match outcome.status {
            LocStatus::Exist => format!(
                "{} is here, about {:.0} m away.",
                outcome.target_name.as_deref().unwrap_or(&wanted),
                outcome.distance.unwrap_or_default()
            ),
            LocStatus::NotFound if !outcome.candidates.is_empty() => format!(
                "{} matches several entities ({}); name one of them.",
                wanted,
                outcome.candidates.join(", ")
            ),
            LocStatus::NotFound => match self.graph.nearest(pose.location()) {
                Some((closest, meters)) => format!(
                    "{} was not found nearby. The closest thing is {}, about {:.0} m away.",
                    wanted,
                    closest.display_name(),
                    meters
                ),
                None => format!("{} was not found nearby.", wanted),
            },
            LocStatus::Error => "A target name is required.".to_string(),
        };
        CheckReply {
            status: outcome.status,
            answer,
            target_name: outcome.target_name,
            target_id: outcome.target_id,
        }
    }

    pub fn move_to_target(&mut self, request: &MoveRequest) -> MoveReply {
        let outcome = {
            let resolver = TargetResolver::new(&self.graph, &self.policy);
            resolver.move_to_target(&mut self.tracker, request)
        };
        let name = outcome.target_name.as_deref().unwrap_or("the route");
        let answer = match outcome.status {
            MoveStatus::Moved if outcome.route.as_ref().is_some_and(|r| r.arrived) => {
                "Arrived at the destination.".to_string()
            }
            MoveStatus::Moved => match outcome.remaining {
                Some(left) if left < crate::target::ARRIVAL_TOLERANCE => format!("Arrived at {}.", name),
                Some(left) => format!("Moved toward {}; {:.0} m to go.", name, left),
                None => format!("Moved toward {}.", name),
            },
            MoveStatus::NotMoved if outcome.route.is_some() => "Could not move any further along the route.".to_string(),
            MoveStatus::NotMoved => format!("Already at {} or no distance given.", name),
            MoveStatus::NotFound if request.targets.is_empty() && request.target_id.is_none() => {
                "No target given and no route is loaded.".to_string()
            }
            MoveStatus::NotFound => "The target was not found nearby.".to_string(),
            MoveStatus::Error => "The move request was malformed.".to_string(),
        };
        MoveReply {
            status: outcome.status,
            answer,
            loc: outcome.pose,
        }
    }

    // --- mutations ----------------------------------------------------------

    /// Place an object under a nearby region, the region the observer stands
    /// in, or a new region at the observer.
    pub fn add_object(&mut self, request: PlaceObject) -> AddReply {
        let Some(pose) = request.pose.filter(Pose::is_finite) else {
            return AddReply::failed(AddRemoveStatus::Error, "An observer position is required.");
        };
        if request.type_name.trim().is_empty() {
            return AddReply::failed(AddRemoveStatus::NotAdded, "typeName is required.");
        }

        let has_nearby = request.nearby_target_id.is_some() || !request.nearby_targets.is_empty();
        let nearby = if has_nearby {
            self.graph
                .resolve(
                    request.nearby_target_id.as_deref(),
                    &request.nearby_targets,
                    pose.location(),
                    self.policy.search_radius,
                )
                .best()
                .and_then(|hit| self.graph.get(&hit.id))
        } else {
            None
        };

        // (parent region, anchor point)
        let placement = match nearby {
            Some(Entity::Region(r)) => Some((r.id.clone(), pose.location())),
            Some(Entity::Object(o)) => self
                .graph
                .position(&o.id)
                .map(|at| (o.parent_region_id.clone(), at)),
            None => self
                .graph
                .region_at(pose.location())
                .map(|r| (r.id.clone(), pose.location())),
        };

        let (planar, up) = placement_shift(request.position.as_deref());
        let mut created_region = None;
        let (region_id, anchor) = match placement {
            Some(found) => found,
            None => {
                let spec = NewRegion {
                    type_name: "area".into(),
                    desc: format!("the area around {}", request.type_name.trim()),
                    location: Some(pose.location()),
                    radius: Some(request.radius.unwrap_or(DEFAULT_REGION_RADIUS).max(DEFAULT_REGION_RADIUS)),
                    front_angle: Some(pose.bearing),
                    ..Default::default()
                };
                match self.graph.add(NewEntity::Region(spec)) {
                    Ok(added) => {
                        created_region = Some(added.id.clone());
                        (added.id, pose.location())
                    }
                    Err(e) => return add_failure(e),
                }
            }
        };

        let offset = match self.offset_in_region(&region_id, anchor, &pose, planar, up) {
            Ok(offset) => offset,
            Err(e) => {
                self.rollback_region(created_region);
                return add_failure(e);
            }
        };

        let spec = NewObject {
            parent_region_id: Some(region_id),
            type_name: request.type_name,
            unique_name: request.unique_name,
            desc: request.desc,
            offset: Some(offset),
            radius: request.radius,
            expiration_epoch: request.expiration_epoch,
        };
        match self.graph.add(NewEntity::Object(spec)) {
            Ok(added) => {
                let answer = match added.status {
                    AddRemoveStatus::Changed => {
                        // The existing object keeps its place; a region made for it is unused.
                        self.rollback_region(created_region);
                        "An object with that name already existed and was updated."
                    }
                    _ => "The object was added.",
                };
                let region_id = self
                    .graph
                    .get(&added.id)
                    .and_then(Entity::parent_region_id)
                    .map(str::to_string);
                AddReply {
                    status: added.status,
                    answer: answer.to_string(),
                    object_id: Some(added.id),
                    region_id,
                }
            }
            Err(e) => {
                self.rollback_region(created_region);
                add_failure(e)
            }
        }
    }

    /// Offset of a point near `anchor`, shifted in the observer's frame,
    /// expressed in `region_id`'s frame.
    fn offset_in_region(
        &self,
        region_id: &str,
        anchor: LatLng,
        pose: &Pose,
        planar: DVec2,
        up: f64,
    ) -> Result<Offset3> {
        let region = self
            .graph
            .region(region_id)
            .ok_or_else(|| WorldError::NotFound(region_id.to_string()))?;
        let origin = self
            .graph
            .position(region_id)
            .ok_or_else(|| WorldError::Unresolvable(region_id.to_string()))?;

        let shift = frame_to_enu(planar, pose.bearing);
        let point = offset_latlng(anchor, shift.x, shift.y);
        let local = rotate_to_frame(to_local(origin, point), region.front_angle.unwrap_or(0.0));
        Ok(Offset3 { x: local.x, y: local.y, z: up })
    }

    fn rollback_region(&mut self, created: Option<String>) {
        if let Some(id) = created {
            if let Err(e) = self.graph.remove(&id) {
                tracing::error!(region_id = %id, error = %e, "Failed to roll back implied region");
            }
        }
    }

    pub fn remove_object(&mut self, pose: &Pose, target_id: Option<&str>, targets: &[String]) -> MutationReply {
        if target_id.is_none() && targets.is_empty() {
            return MutationReply::new(AddRemoveStatus::Error, "A targetId or targets is required.");
        }
        let resolution = self
            .graph
            .resolve(target_id, targets, pose.location(), self.policy.search_radius);
        if resolution.is_empty() {
            return MutationReply::new(AddRemoveStatus::NotFound, "The target was not found.");
        }
        let Some(hit) = resolution.unique() else {
            let ids: Vec<&str> = resolution.candidates.iter().map(|c| c.id.as_str()).collect();
            return MutationReply::new(
                AddRemoveStatus::NotRemoved,
                format!("Several entities match ({}); specify targetId.", ids.join(", ")),
            );
        };

        let id = hit.id.clone();
        match self.graph.remove(&id) {
            Ok(removed) => MutationReply::new(
                AddRemoveStatus::Removed,
                format!("{} was removed.", removed.display_name()),
            ),
            Err(WorldError::Blocked(msg)) => MutationReply::new(AddRemoveStatus::NotRemoved, msg),
            Err(WorldError::NotFound(_)) => MutationReply::new(AddRemoveStatus::NotFound, "The target was not found."),
            Err(e) => MutationReply::new(AddRemoveStatus::Error, e.to_string()),
        }
    }

    pub fn change_object(
        &mut self,
        pose: &Pose,
        target_id: Option<&str>,
        targets: &[String],
        patch: &ChangePatch,
    ) -> MutationReply {
        if target_id.is_none() && targets.is_empty() {
            return MutationReply::new(AddRemoveStatus::Error, "A targetId or targets is required.");
        }
        if patch.is_empty() {
            return MutationReply::new(AddRemoveStatus::Error, "Nothing to change.");
        }
        let resolution = self
            .graph
            .resolve(target_id, targets, pose.location(), self.policy.search_radius);
        let Some(hit) = resolution.best() else {
            return MutationReply::new(AddRemoveStatus::NotFound, "The target was not found.");
        };

        let id = hit.id.clone();
        match self.graph.change(&id, patch) {
            Ok(()) => MutationReply::new(AddRemoveStatus::Changed, "The target was changed."),
            Err(WorldError::NotFound(what)) => {
                MutationReply::new(AddRemoveStatus::NotFound, format!("{} was not found.", what))
            }
            Err(e) => MutationReply::new(AddRemoveStatus::Error, e.to_string()),
        }
    }

    // --- route --------------------------------------------------------------

    pub fn load_route(&mut self, sources: Vec<RouteSource>) -> Result<RouteProgress> {
        self.tracker.load_route(sources)?;
        Ok(self.route_progress())
    }

    pub fn reset_route(&mut self) {
        self.tracker.reset();
    }

    pub fn route_progress(&self) -> RouteProgress {
        RouteProgress {
            state: self.tracker.state(),
            offset: self.tracker.offset(),
            total_length: self.tracker.total_length(),
            pose: self.tracker.current_pose(),
            steps: self.tracker.steps().to_vec(),
        }
    }

    /// Objects whose type or unique name contains `query` (case-insensitive).
    pub fn search_objects(&self, query: &str) -> Vec<Entity> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Entity> = self
            .graph
            .iter()
            .filter(|e| {
                e.type_name().to_lowercase().contains(&needle)
                    || e.unique_name().is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id().cmp(b.id()));
        hits
    }
}

fn add_failure(error: WorldError) -> AddReply {
    let status = match error {
        WorldError::InvalidRequest(_) | WorldError::NotFound(_) | WorldError::Blocked(_) => {
            AddRemoveStatus::NotAdded
        }
        _ => AddRemoveStatus::Error,
    };
    AddReply::failed(status, error.to_string())
}

// ============================================================================
// 3. WorldStore
// ============================================================================

/// All users' worlds.
pub struct WorldStore {
    users: RwLock<HashMap<String, Arc<RwLock<UserWorld>>>>,
    policy: ViewPolicy,
}

impl WorldStore {
    pub fn new(policy: ViewPolicy) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &ViewPolicy {
        &self.policy
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    fn existing(&self, user_id: &str) -> Option<Arc<RwLock<UserWorld>>> {
        self.users.read().get(user_id).cloned()
    }

    fn get_or_create(&self, user_id: &str) -> Arc<RwLock<UserWorld>> {
        if let Some(world) = self.existing(user_id) {
            return world;
        }
        let mut users = self.users.write();
        users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::info!(user_id = %user_id, "Created world");
                Arc::new(RwLock::new(UserWorld::new(self.policy.clone())))
            })
            .clone()
    }

    /// Run `f` against a consistent snapshot of the user's world.
    /// Unknown users see an empty world.
    pub fn read<R>(&self, user_id: &str, f: impl FnOnce(&UserWorld) -> R) -> R {
        let Some(world) = self.existing(user_id) else {
            return f(&UserWorld::new(self.policy.clone()));
        };
        let now = chrono::Utc::now().timestamp();
        if world.read().has_expired(now) {
            world.write().graph.sweep_expired(now);
        }
        let guard = world.read();
        f(&guard)
    }

    /// Run `f` with exclusive access to the user's world.
    pub fn write<R>(&self, user_id: &str, f: impl FnOnce(&mut UserWorld) -> R) -> R {
        let world = self.get_or_create(user_id);
        let mut guard = world.write();
        guard.graph.sweep_expired(chrono::Utc::now().timestamp());
        f(&mut guard)
    }
}
