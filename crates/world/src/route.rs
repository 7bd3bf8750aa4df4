//! # Route Tracking
//!
//! Flattens provider directions into one cumulative-offset path and moves an
//! avatar along it by distance.
//!
//! ## Table of Contents
//! 1. Provider wire types (GmRoute, GmLeg, GmStep)
//! 2. Flattened path (DirectionStep, RelayPoint, RouteSource)
//! 3. RouteTracker - load / proceed / reset
//!
//! ## States
//! ```text
//! Idle --load--> OnRoute(pathNo, stepNo, offset) --proceed(>= rest)--> Arrived
//!  ^                                                                      |
//!  +------------------------------- reset --------------------------------+
//! ```

use mapspace_geo::{bearing_between, distance, interpolate, LatLng, Pose};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::status::MoveStatus;

/// Offsets closer than this are treated as equal when checking contiguity.
const OFFSET_TOLERANCE: f64 = 1e-6;

// ============================================================================
// 1. Provider wire types
// ============================================================================

/// `{ text, value }` pair used for distances (meters) and durations (seconds).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GmLatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<GmLatLng> for LatLng {
    fn from(p: GmLatLng) -> Self {
        LatLng::new(p.lat, p.lng)
    }
}

impl From<LatLng> for GmLatLng {
    fn from(p: LatLng) -> Self {
        GmLatLng { lat: p.lat, lng: p.lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmStep {
    pub html_instructions: String,
    pub distance: TextValue,
    pub duration: TextValue,
    pub start_location: GmLatLng,
    pub end_location: GmLatLng,
    /// Turn hint; ferry segments carry `"ferry"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maneuver: Option<String>,
    pub travel_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmLeg {
    #[serde(default)]
    pub start_address: Option<String>,
    #[serde(default)]
    pub end_address: Option<String>,
    #[serde(default)]
    pub start_location: Option<GmLatLng>,
    #[serde(default)]
    pub end_location: Option<GmLatLng>,
    pub distance: TextValue,
    pub duration: TextValue,
    #[serde(default)]
    pub steps: Vec<GmStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmRoute {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub legs: Vec<GmLeg>,
}

/// Directions response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmDirections {
    pub status: String,
    #[serde(default)]
    pub routes: Vec<GmRoute>,
}

// ============================================================================
// 2. Flattened path
// ============================================================================

/// One step of the flattened path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionStep {
    #[serde(flatten)]
    pub step: GmStep,
    /// Index of the joined route this step came from
    #[serde(rename = "pathNo")]
    pub path_no: usize,
    /// Index within that route
    #[serde(rename = "stepNo")]
    pub step_no: usize,
    #[serde(rename = "isRelayPoint")]
    pub is_relay_point: bool,
    /// Cumulative offset (meters) where this step begins
    pub start: f64,
    /// Cumulative offset (meters) where this step ends
    pub end: f64,
}

impl DirectionStep {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn start_location(&self) -> LatLng {
        self.step.start_location.into()
    }

    pub fn end_location(&self) -> LatLng {
        self.step.end_location.into()
    }
}

/// A manually inserted waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPoint {
    pub location: LatLng,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub maneuver: Option<String>,
}

/// One input to [`RouteTracker::load_route`].
#[derive(Debug, Clone, PartialEq)]
pub enum RouteSource {
    Directions(GmRoute),
    Relay(RelayPoint),
}

/// Where the avatar is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TrackerState {
    Idle,
    #[serde(rename_all = "camelCase")]
    OnRoute { path_no: usize, step_no: usize, offset: f64 },
    Arrived { offset: f64 },
}

/// Result of [`RouteTracker::proceed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceedOutcome {
    pub status: MoveStatus,
    pub pose: Option<Pose>,
    pub path_no: Option<usize>,
    pub step_no: Option<usize>,
    pub offset: f64,
    /// This call reached the end of the path
    pub arrived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maneuver: Option<String>,
}

impl ProceedOutcome {
    fn without_route(status: MoveStatus) -> Self {
        Self {
            status,
            pose: None,
            path_no: None,
            step_no: None,
            offset: 0.0,
            arrived: false,
            maneuver: None,
        }
    }
}

// ============================================================================
// 3. RouteTracker
// ============================================================================

/// Progress cursor over a flattened path.
#[derive(Debug, Clone, Default)]
pub struct RouteTracker {
    steps: Vec<DirectionStep>,
    offset: f64,
    bearing: f64,
}

impl RouteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten `sources` and start at offset 0. On error the previous path
    /// and progress are kept.
    pub fn load_route(&mut self, sources: Vec<RouteSource>) -> Result<&[DirectionStep]> {
        let steps = flatten(sources)?;
        self.install(steps);
        tracing::info!(
            steps = self.steps.len(),
            total_length = self.total_length(),
            "Route loaded"
        );
        Ok(&self.steps)
    }

    /// Restore an already flattened path after checking its offsets.
    pub fn load_steps(&mut self, steps: Vec<DirectionStep>) -> Result<()> {
        validate_steps(&steps)?;
        self.install(steps);
        Ok(())
    }

    fn install(&mut self, steps: Vec<DirectionStep>) {
        self.bearing = steps
            .iter()
            .find(|s| s.start_location() != s.end_location())
            .map(|s| bearing_between(s.start_location(), s.end_location()))
            .unwrap_or(0.0);
        self.steps = steps;
        self.offset = 0.0;
    }

    /// Drop the path and return to `Idle`.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.offset = 0.0;
        self.bearing = 0.0;
        tracing::debug!("Route reset");
    }

    pub fn steps(&self) -> &[DirectionStep] {
        &self.steps
    }

    pub fn is_on_route(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn total_length(&self) -> f64 {
        self.steps.last().map(|s| s.end).unwrap_or(0.0)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn state(&self) -> TrackerState {
        if self.steps.is_empty() {
            return TrackerState::Idle;
        }
        if self.offset >= self.total_length() {
            return TrackerState::Arrived { offset: self.offset };
        }
        match self.locate(self.offset) {
            Some(step) => TrackerState::OnRoute {
                path_no: step.path_no,
                step_no: step.step_no,
                offset: self.offset,
            },
            None => TrackerState::Idle,
        }
    }

    /// Avatar pose at the current offset, `None` when idle.
    pub fn current_pose(&self) -> Option<Pose> {
        let step = self.locate(self.offset)?;
        Some(Pose::at(self.location_on(step, self.offset), self.bearing))
    }

    /// Advance (or, with a negative distance, retreat) along the path.
    pub fn proceed(&mut self, meters: f64) -> ProceedOutcome {
        if self.steps.is_empty() {
            return ProceedOutcome::without_route(MoveStatus::NotFound);
        }
        if !meters.is_finite() {
            tracing::warn!(meters, "Rejected non-finite proceed distance");
            return ProceedOutcome::without_route(MoveStatus::Error);
        }

        let total = self.total_length();
        let before = self.offset;
        let after = (before + meters).clamp(0.0, total);

        if (after - before).abs() < OFFSET_TOLERANCE {
            return self.outcome(MoveStatus::NotMoved, false, None);
        }

        let crossed_relay = self.last_relay_between(before, after);
        self.offset = after;

        let Some(step) = self.locate(after) else {
            return ProceedOutcome::without_route(MoveStatus::Error);
        };
        // Zero-length steps keep the previous heading
        let heading = (step.start_location() != step.end_location())
            .then(|| bearing_between(step.start_location(), step.end_location()));
        if let Some(heading) = heading {
            self.bearing = heading;
        }

        let arrived = after >= total && before < total;
        let outcome = self.outcome(MoveStatus::Moved, arrived, crossed_relay);
        tracing::debug!(
            from = before,
            to = after,
            path_no = ?outcome.path_no,
            step_no = ?outcome.step_no,
            arrived,
            "Proceeded along route"
        );
        outcome
    }

    fn outcome(&self, status: MoveStatus, arrived: bool, crossed_relay: Option<String>) -> ProceedOutcome {
        let step = self.locate(self.offset);
        ProceedOutcome {
            status,
            pose: self.current_pose(),
            path_no: step.map(|s| s.path_no),
            step_no: step.map(|s| s.step_no),
            offset: self.offset,
            arrived,
            maneuver: step.and_then(|s| s.step.maneuver.clone()).or(crossed_relay),
        }
    }

    /// Step whose `[start, end)` contains `offset`; the last step at the very end.
    fn locate(&self, offset: f64) -> Option<&DirectionStep> {
        let idx = self.steps.partition_point(|s| s.end <= offset);
        self.steps.get(idx).or_else(|| self.steps.last())
    }

    fn location_on(&self, step: &DirectionStep, offset: f64) -> LatLng {
        let length = step.length();
        let ratio = if length > 0.0 {
            (offset - step.start) / length
        } else {
            1.0
        };
        interpolate(step.start_location(), step.end_location(), ratio)
    }

    /// Maneuver of the relay nearest to `to` that lies between the two offsets.
    fn last_relay_between(&self, from: f64, to: f64) -> Option<String> {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        let crossed = self
            .steps
            .iter()
            .filter(|s| s.is_relay_point && s.start >= lo && s.start <= hi);
        let nearest = if from <= to {
            crossed.last()
        } else {
            crossed.min_by(|a, b| a.start.total_cmp(&b.start))
        };
        nearest.and_then(|s| s.step.maneuver.clone())
    }
}

fn flatten(sources: Vec<RouteSource>) -> Result<Vec<DirectionStep>> {
    if sources.is_empty() {
        return Err(WorldError::InvalidRoute("no route to load".into()));
    }

    let mut steps: Vec<DirectionStep> = Vec::new();
    let mut next_path_no = 0;
    let mut cursor = 0.0;

    for source in sources {
        match source {
            RouteSource::Directions(route) => {
                if route.legs.is_empty() {
                    return Err(WorldError::InvalidRoute(format!("route {} has no legs", next_path_no)));
                }
                let path_no = next_path_no;
                next_path_no += 1;
                let mut step_no = 0;
                for (leg_no, leg) in route.legs.into_iter().enumerate() {
                    if leg.steps.is_empty() {
                        return Err(WorldError::InvalidRoute(format!(
                            "route {} leg {} has no steps",
                            path_no, leg_no
                        )));
                    }
                    for step in leg.steps {
                        let length = step.distance.value;
                        if !length.is_finite() || length < 0.0 {
                            return Err(WorldError::InvalidRoute(format!(
                                "route {} step {} has distance {}",
                                path_no, step_no, length
                            )));
                        }
                        steps.push(DirectionStep {
                            step,
                            path_no,
                            step_no,
                            is_relay_point: false,
                            start: cursor,
                            end: cursor + length,
                        });
                        cursor += length;
                        step_no += 1;
                    }
                }
            }
            RouteSource::Relay(relay) => {
                let prev = steps.last().ok_or_else(|| {
                    WorldError::InvalidRoute("relay point needs a preceding route".into())
                })?;
                let from = prev.end_location();
                let gap = distance(from, relay.location);
                let step = GmStep {
                    html_instructions: relay
                        .instructions
                        .unwrap_or_else(|| "Continue to the relay point".to_string()),
                    distance: TextValue { text: distance_text(gap), value: gap },
                    duration: TextValue { text: "0 mins".to_string(), value: 0.0 },
                    start_location: from.into(),
                    end_location: relay.location.into(),
                    maneuver: relay.maneuver,
                    travel_mode: prev.step.travel_mode.clone(),
                };
                let (path_no, step_no) = (prev.path_no, prev.step_no + 1);
                steps.push(DirectionStep {
                    step,
                    path_no,
                    step_no,
                    is_relay_point: true,
                    start: cursor,
                    end: cursor + gap,
                });
                cursor += gap;
            }
        }
    }

    Ok(steps)
}

fn validate_steps(steps: &[DirectionStep]) -> Result<()> {
    let first = steps
        .first()
        .ok_or_else(|| WorldError::InvalidRoute("empty step list".into()))?;
    if first.start.abs() > OFFSET_TOLERANCE {
        return Err(WorldError::InvalidRoute(format!("path starts at {}", first.start)));
    }
    for (i, step) in steps.iter().enumerate() {
        if !(step.start.is_finite() && step.end.is_finite()) || step.end < step.start {
            return Err(WorldError::InvalidRoute(format!(
                "step {} spans [{}, {})",
                i, step.start, step.end
            )));
        }
        if let Some(next) = steps.get(i + 1) {
            if (next.start - step.end).abs() > OFFSET_TOLERANCE {
                return Err(WorldError::InvalidRoute(format!(
                    "step {} ends at {} but step {} starts at {}",
                    i,
                    step.end,
                    i + 1,
                    next.start
                )));
            }
        }
    }
    Ok(())
}

fn distance_text(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", meters.round())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapspace_geo::offset_latlng;

    fn origin() -> LatLng {
        LatLng::new(35.0, 139.0)
    }

    fn gm_step(from: LatLng, to: LatLng, meters: f64) -> GmStep {
        GmStep {
            html_instructions: "Head north".into(),
            distance: TextValue { text: distance_text(meters), value: meters },
            duration: TextValue { text: "1 min".into(), value: 60.0 },
            start_location: from.into(),
            end_location: to.into(),
            maneuver: None,
            travel_mode: "WALKING".into(),
        }
    }

    fn gm_route(steps: Vec<GmStep>) -> GmRoute {
        GmRoute {
            summary: "test".into(),
            legs: vec![GmLeg {
                start_address: None,
                end_address: None,
                start_location: None,
                end_location: None,
                distance: TextValue::default(),
                duration: TextValue::default(),
                steps,
            }],
        }
    }

    /// Two steps due north: [0, 100) and [100, 250).
    fn two_step_route() -> GmRoute {
        let a = origin();
        let b = offset_latlng(a, 0.0, 100.0);
        let c = offset_latlng(a, 0.0, 250.0);
        gm_route(vec![gm_step(a, b, 100.0), gm_step(b, c, 150.0)])
    }

    #[test]
    fn test_idle_tracker_reports_not_found() {
        let mut tracker = RouteTracker::new();
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.proceed(10.0).status, MoveStatus::NotFound);
        assert!(tracker.current_pose().is_none());
    }

    #[test]
    fn test_flatten_assigns_cumulative_offsets() {
        let mut tracker = RouteTracker::new();
        let steps = tracker
            .load_route(vec![
                RouteSource::Directions(two_step_route()),
                RouteSource::Directions(two_step_route()),
            ])
            .unwrap();

        let spans: Vec<(usize, usize, f64, f64)> =
            steps.iter().map(|s| (s.path_no, s.step_no, s.start, s.end)).collect();
        assert_eq!(
            spans,
            vec![
                (0, 0, 0.0, 100.0),
                (0, 1, 100.0, 250.0),
                (1, 0, 250.0, 350.0),
                (1, 1, 350.0, 500.0),
            ]
        );
        assert_eq!(tracker.total_length(), 500.0);
    }

    #[test]
    fn test_relay_is_spliced_contiguously() {
        let relay_at = offset_latlng(origin(), 0.0, 300.0);
        let mut tracker = RouteTracker::new();
        let steps = tracker
            .load_route(vec![
                RouteSource::Directions(two_step_route()),
                RouteSource::Relay(RelayPoint {
                    location: relay_at,
                    instructions: None,
                    maneuver: Some("ferry".into()),
                }),
            ])
            .unwrap();

        assert_eq!(steps.len(), 3);
        let relay = &steps[2];
        assert!(relay.is_relay_point);
        assert_eq!((relay.path_no, relay.step_no), (0, 2));
        assert_eq!(relay.start, 250.0);
        assert!((relay.length() - 50.0).abs() < 0.5);
        assert_eq!(relay.step.duration.value, 0.0);
    }

    #[test]
    fn test_relay_first_is_rejected_and_state_kept() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();
        tracker.proceed(50.0);

        let err = tracker
            .load_route(vec![RouteSource::Relay(RelayPoint {
                location: origin(),
                instructions: None,
                maneuver: None,
            })])
            .unwrap_err();
        assert!(matches!(err, WorldError::InvalidRoute(_)));
        assert_eq!(tracker.offset(), 50.0);
        assert_eq!(tracker.steps().len(), 2);

        let empty_leg = GmRoute { summary: String::new(), legs: vec![] };
        assert!(tracker.load_route(vec![RouteSource::Directions(empty_leg)]).is_err());
        assert!(tracker.load_route(vec![]).is_err());
        assert_eq!(tracker.steps().len(), 2);
    }

    #[test]
    fn test_proceed_interpolates_within_step() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();

        let outcome = tracker.proceed(150.0);
        assert_eq!(outcome.status, MoveStatus::Moved);
        assert_eq!((outcome.path_no, outcome.step_no), (Some(0), Some(1)));

        let pose = outcome.pose.unwrap();
        let step_start = offset_latlng(origin(), 0.0, 100.0);
        let step_end = offset_latlng(origin(), 0.0, 250.0);
        let expected = interpolate(step_start, step_end, 1.0 / 3.0);
        assert!(distance(pose.location(), expected) < 1e-6);
        assert!(pose.bearing < 1e-6 || pose.bearing > 360.0 - 1e-6);
    }

    #[test]
    fn test_arrival_is_reported_once() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();

        assert!(!tracker.proceed(100.0).arrived);
        let last = tracker.proceed(150.0);
        assert_eq!(last.status, MoveStatus::Moved);
        assert!(last.arrived);
        assert_eq!(tracker.state(), TrackerState::Arrived { offset: 250.0 });

        let beyond = tracker.proceed(10.0);
        assert_eq!(beyond.status, MoveStatus::NotMoved);
        assert!(!beyond.arrived);
        assert_eq!(tracker.offset(), 250.0);
    }

    #[test]
    fn test_backward_clamps_at_zero() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();
        tracker.proceed(30.0);

        let back = tracker.proceed(-100.0);
        assert_eq!(back.status, MoveStatus::Moved);
        assert_eq!(tracker.offset(), 0.0);
        assert_eq!(tracker.proceed(-5.0).status, MoveStatus::NotMoved);
        assert_eq!(tracker.proceed(0.0).status, MoveStatus::NotMoved);
        assert_eq!(tracker.proceed(f64::NAN).status, MoveStatus::Error);
    }

    #[test]
    fn test_crossing_relay_surfaces_maneuver() {
        let relay_at = offset_latlng(origin(), 0.0, 300.0);
        let mut tracker = RouteTracker::new();
        tracker
            .load_route(vec![
                RouteSource::Directions(two_step_route()),
                RouteSource::Relay(RelayPoint {
                    location: relay_at,
                    instructions: None,
                    maneuver: Some("ferry".into()),
                }),
            ])
            .unwrap();

        assert_eq!(tracker.proceed(100.0).maneuver, None);
        assert_eq!(tracker.proceed(170.0).maneuver.as_deref(), Some("ferry"));
    }

    #[test]
    fn test_load_steps_checks_contiguity() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();
        let mut steps = tracker.steps().to_vec();

        let mut restored = RouteTracker::new();
        restored.load_steps(steps.clone()).unwrap();
        assert_eq!(restored.total_length(), 250.0);

        steps[1].start = 120.0;
        let err = restored.load_steps(steps).unwrap_err();
        assert!(matches!(err, WorldError::InvalidRoute(_)));
        assert_eq!(restored.total_length(), 250.0);
        assert!(restored.load_steps(vec![]).is_err());

        restored.reset();
        assert_eq!(restored.state(), TrackerState::Idle);
    }

    #[test]
    fn test_direction_step_wire_names() {
        let mut tracker = RouteTracker::new();
        tracker.load_route(vec![RouteSource::Directions(two_step_route())]).unwrap();
        let json = serde_json::to_value(&tracker.steps()[1]).unwrap();
        assert_eq!(json["pathNo"], 0);
        assert_eq!(json["stepNo"], 1);
        assert_eq!(json["isRelayPoint"], false);
        assert_eq!(json["start"], 100.0);
        assert_eq!(json["travel_mode"], "WALKING");
        assert!(json["start_location"]["lat"].is_number());

        let back: DirectionStep = serde_json::from_value(json).unwrap();
        assert_eq!(back, tracker.steps()[1]);
    }
}
