//! Target resolution and movement toward targets or along the route.

use mapspace_geo::{bearing_between, destination_point, distance, Pose};
use serde::{Deserialize, Serialize};

use crate::graph::{Resolution, WorldGraph};
use crate::route::{ProceedOutcome, RouteTracker};
use crate::status::{LocStatus, MoveStatus};
use crate::view::ViewPolicy;

/// Closer than this (meters) counts as already at the target.
pub const ARRIVAL_TOLERANCE: f64 = 0.01;

/// A movement request. With no target the avatar follows the loaded route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Observer pose; the route position is used when absent
    pub pose: Option<Pose>,
    /// Meters to move
    pub proceed: f64,
    pub target_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl MoveRequest {
    fn has_target(&self) -> bool {
        self.target_id.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.targets.iter().any(|t| !t.trim().is_empty())
    }
}

/// Result of an existence check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: LocStatus,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    /// Candidate ids when the name was ambiguous
    pub candidates: Vec<String>,
    /// Distance to the resolved target in meters
    pub distance: Option<f64>,
}

impl CheckOutcome {
    fn status(status: LocStatus) -> Self {
        Self {
            status,
            target_id: None,
            target_name: None,
            candidates: Vec::new(),
            distance: None,
        }
    }
}

/// Result of a move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub status: MoveStatus,
    pub pose: Option<Pose>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    /// Meters still separating the avatar from the target
    pub remaining: Option<f64>,
    /// Set when the move was delegated to the route tracker
    pub route: Option<ProceedOutcome>,
}

impl MoveOutcome {
    fn status(status: MoveStatus) -> Self {
        Self {
            status,
            pose: None,
            target_id: None,
            target_name: None,
            remaining: None,
            route: None,
        }
    }
}

/// Resolves targets against one graph.
pub struct TargetResolver<'a> {
    graph: &'a WorldGraph,
    policy: &'a ViewPolicy,
}

impl<'a> TargetResolver<'a> {
    pub fn new(graph: &'a WorldGraph, policy: &'a ViewPolicy) -> Self {
        Self { graph, policy }
    }

    fn resolve(&self, pose: &Pose, target_id: Option<&str>, targets: &[String]) -> Resolution {
        self.graph
            .resolve(target_id, targets, pose.location(), self.policy.search_radius)
    }

    /// `exist` when the target resolves to exactly one entity.
    pub fn check_target(&self, pose: &Pose, target_id: Option<&str>, targets: &[String]) -> CheckOutcome {
        let no_id = target_id.map_or(true, |t| t.trim().is_empty());
        let blank_name = targets.iter().any(|t| t.trim().is_empty());
        if !pose.is_finite() || (no_id && targets.is_empty()) || blank_name {
            return CheckOutcome::status(LocStatus::Error);
        }

        let resolution = self.resolve(pose, target_id, targets);
        match resolution.unique() {
            Some(hit) => CheckOutcome {
                status: LocStatus::Exist,
                target_id: Some(hit.id.clone()),
                target_name: self.graph.get(&hit.id).map(|e| e.display_name().to_string()),
                candidates: Vec::new(),
                distance: Some(hit.distance),
            },
            None => CheckOutcome {
                candidates: resolution.candidates.iter().map(|c| c.id.clone()).collect(),
                ..CheckOutcome::status(LocStatus::NotFound)
            },
        }
    }

    /// Move toward the named target, or along the route when no target is given.
    pub fn move_to_target(&self, tracker: &mut RouteTracker, request: &MoveRequest) -> MoveOutcome {
        if !request.proceed.is_finite() || request.pose.is_some_and(|p| !p.is_finite()) {
            return MoveOutcome::status(MoveStatus::Error);
        }

        if !request.has_target() {
            if !tracker.is_on_route() {
                return MoveOutcome::status(MoveStatus::NotFound);
            }
            let outcome = tracker.proceed(request.proceed);
            return MoveOutcome {
                status: outcome.status,
                pose: outcome.pose,
                target_id: None,
                target_name: None,
                remaining: Some(tracker.total_length() - tracker.offset()),
                route: Some(outcome),
            };
        }

        let Some(observer) = request.pose.or_else(|| tracker.current_pose()) else {
            return MoveOutcome::status(MoveStatus::Error);
        };

        let resolution = self.resolve(&observer, request.target_id.as_deref(), &request.targets);
        let Some(best) = resolution.best() else {
            return MoveOutcome::status(MoveStatus::NotFound);
        };
        let Some(target_at) = self.graph.position(&best.id) else {
            return MoveOutcome::status(MoveStatus::NotFound);
        };

        let target_id = Some(best.id.clone());
        let target_name = self.graph.get(&best.id).map(|e| e.display_name().to_string());
        let here = observer.location();
        let gap = distance(here, target_at);

        if request.proceed <= 0.0 || gap < ARRIVAL_TOLERANCE {
            return MoveOutcome {
                status: MoveStatus::NotMoved,
                pose: Some(observer),
                target_id,
                target_name,
                remaining: Some(gap),
                route: None,
            };
        }

        let heading = bearing_between(here, target_at);
        let step = request.proceed.min(gap);
        let landed = if step >= gap {
            target_at
        } else {
            destination_point(here, heading, step)
        };

        tracing::debug!(
            target_id = %best.id,
            moved = step,
            remaining = gap - step,
            "Moved toward target"
        );

        MoveOutcome {
            status: MoveStatus::Moved,
            pose: Some(Pose::at(landed, heading)),
            target_id,
            target_name,
            remaining: Some(gap - step),
            route: None,
        }
    }
}
