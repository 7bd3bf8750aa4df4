//! # View Projection
//!
//! Projects the world graph into the observer's camera frame and buckets each
//! visible entity into a position class (`camPos`) and a distance class
//! (`camDist`).
//!
//! ## Table of Contents
//! 1. ViewPolicy - radii and bucket thresholds
//! 2. ViewRecord / ViewInfoEntry - derived per-entity records
//! 3. ViewProjector - projection, view info, region map
//! 4. Classification

use mapspace_geo::{distance, to_camera_frame, Pose};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::graph::{Entity, EntityKind, WorldGraph};
use crate::status::{CamDist, CamPos};

/// Distances below this are treated as "on top of the observer".
const COINCIDENT_EPSILON: f64 = 1e-6;

// ============================================================================
// 1. ViewPolicy
// ============================================================================

/// Tunable view parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPolicy {
    /// Entities farther than this (meters) are not projected
    pub view_radius: f64,
    /// Radius for type-name target resolution (meters)
    pub search_radius: f64,
    /// Half width of the center column / row of the camPos grid (degrees)
    pub front_half_angle: f64,
    /// `dist / view_radius` below which an entity is "very close"
    pub very_close: f64,
    /// `dist / view_radius` below which an entity is "close"
    pub close: f64,
    /// `dist / view_radius` below which an entity is "in distance"
    pub in_distance: f64,
}

impl Default for ViewPolicy {
    fn default() -> Self {
        Self {
            view_radius: 200.0,
            search_radius: 200.0,
            front_half_angle: 20.0,
            very_close: 0.1,
            close: 0.4,
            in_distance: 1.0,
        }
    }
}

impl ViewPolicy {
    /// Reject radii and thresholds that would make the buckets non-monotonic.
    pub fn validate(&self) -> Result<()> {
        if !(self.view_radius.is_finite() && self.view_radius > 0.0) {
            return Err(WorldError::InvalidRequest(format!(
                "view_radius must be positive, got {}",
                self.view_radius
            )));
        }
        if !(self.search_radius.is_finite() && self.search_radius >= 0.0) {
            return Err(WorldError::InvalidRequest(format!(
                "search_radius must be non-negative, got {}",
                self.search_radius
            )));
        }
        if !(self.front_half_angle > 0.0 && self.front_half_angle < 90.0) {
            return Err(WorldError::InvalidRequest(format!(
                "front_half_angle must lie in (0, 90), got {}",
                self.front_half_angle
            )));
        }
        if !(0.0 < self.very_close && self.very_close <= self.close && self.close <= self.in_distance) {
            return Err(WorldError::InvalidRequest(
                "distance thresholds must satisfy 0 < very_close <= close <= in_distance".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 2. Records
// ============================================================================

/// One entity as seen from an observer pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub id: String,
    #[serde(skip)]
    pub kind: Option<EntityKind>,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub parent_region_id: Option<String>,
    /// Region directly contains at least one object
    pub has_object: bool,
    pub desc: String,
    /// Meters from the observer, including height
    pub dist: f64,
    pub radius: f64,
    pub cam_pos: CamPos,
    pub cam_dist: CamDist,
    /// Camera-frame (right, forward) in meters
    pub pos2d: [f64; 2],
    /// Camera-frame (right, forward, up) in meters
    pub pos3d: [f64; 3],
}

impl ViewRecord {
    pub fn is_region(&self) -> bool {
        self.kind == Some(EntityKind::Region)
    }

    pub fn display_name(&self) -> &str {
        self.unique_name.as_deref().unwrap_or(&self.type_name)
    }
}

/// Reduced record returned by the view-info and region-map queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfoEntry {
    pub id: String,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub has_object: bool,
    pub desc: String,
    pub dist: f64,
    pub radius: f64,
    pub cam_pos: CamPos,
    pub cam_dist: CamDist,
}

impl From<&ViewRecord> for ViewInfoEntry {
    fn from(record: &ViewRecord) -> Self {
        Self {
            id: record.id.clone(),
            type_name: record.type_name.clone(),
            unique_name: record.unique_name.clone(),
            has_object: record.has_object,
            desc: record.desc.clone(),
            dist: record.dist,
            radius: record.radius,
            cam_pos: record.cam_pos,
            cam_dist: record.cam_dist,
        }
    }
}

/// Visible regions and objects plus the description of the enclosing region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    pub region_desc: String,
    pub regions: Vec<ViewInfoEntry>,
    pub objects: Vec<ViewInfoEntry>,
}

/// The observer's surroundings expressed relative to the current region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMap {
    pub lat: f64,
    pub lng: f64,
    pub bearing: f64,
    pub region_desc: String,
    /// Nearby regions the observer is not inside
    pub exclude_regions: Vec<ViewInfoEntry>,
    /// Objects contained (at any depth) in the current region
    pub reachable_objects: Vec<ViewInfoEntry>,
}

// ============================================================================
// 3. ViewProjector
// ============================================================================

/// Read-only projection of one graph under one policy.
pub struct ViewProjector<'a> {
    graph: &'a WorldGraph,
    policy: &'a ViewPolicy,
}

impl<'a> ViewProjector<'a> {
    pub fn new(graph: &'a WorldGraph, policy: &'a ViewPolicy) -> Self {
        Self { graph, policy }
    }

    /// Project explicit candidates, dropping those beyond `radius`.
    /// Sorted by distance, ties by id.
    pub fn project<'e>(
        &self,
        pose: &Pose,
        candidates: impl IntoIterator<Item = &'e Entity>,
        radius: f64,
    ) -> Vec<ViewRecord> {
        let mut records: Vec<ViewRecord> = candidates
            .into_iter()
            .filter(|entity| {
                self.graph
                    .position(entity.id())
                    .is_some_and(|at| distance(pose.location(), at) <= radius)
            })
            .filter_map(|entity| self.record(pose, entity))
            .collect();
        sort_records(&mut records);
        records
    }

    /// Everything within the policy's view radius.
    pub fn view(&self, pose: &Pose) -> Vec<ViewRecord> {
        let candidates = self
            .graph
            .nearby(pose.location(), self.policy.view_radius)
            .into_iter()
            .map(|(entity, _)| entity);
        let records = self.project(pose, candidates, self.policy.view_radius);
        tracing::debug!(
            lat = pose.lat,
            lng = pose.lng,
            bearing = pose.bearing,
            visible = records.len(),
            "Projected view"
        );
        records
    }

    /// Visible entities split by kind, plus the enclosing region's description.
    pub fn view_info(&self, pose: &Pose) -> ViewInfo {
        let records = self.view(pose);
        let (regions, objects): (Vec<&ViewRecord>, Vec<&ViewRecord>) =
            records.iter().partition(|r| r.is_region());

        ViewInfo {
            region_desc: self.current_region_desc(pose),
            regions: regions.into_iter().map(ViewInfoEntry::from).collect(),
            objects: objects.into_iter().map(ViewInfoEntry::from).collect(),
        }
    }

    /// Nearby regions outside the observer, and the objects inside the
    /// region the observer stands in.
    pub fn region_map(&self, pose: &Pose) -> RegionMap {
        let here = pose.location();
        let containing: Vec<&str> = self
            .graph
            .regions_containing(here)
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        let current = containing.first().copied();

        let exclude_regions = self
            .view(pose)
            .iter()
            .filter(|r| r.is_region() && !containing.contains(&r.id.as_str()))
            .map(ViewInfoEntry::from)
            .collect();

        let reachable_objects = match current {
            Some(region_id) => {
                let inside = self
                    .graph
                    .iter()
                    .filter(|e| e.kind() == EntityKind::Object)
                    .filter(|e| self.is_within(e, region_id));
                self.project(pose, inside, f64::INFINITY)
                    .iter()
                    .map(ViewInfoEntry::from)
                    .collect()
            }
            None => Vec::new(),
        };

        RegionMap {
            lat: pose.lat,
            lng: pose.lng,
            bearing: pose.bearing,
            region_desc: self.current_region_desc(pose),
            exclude_regions,
            reachable_objects,
        }
    }

    fn current_region_desc(&self, pose: &Pose) -> String {
        self.graph
            .region_at(pose.location())
            .map(|r| r.desc.clone())
            .unwrap_or_default()
    }

    /// Whether `entity` has `region_id` somewhere up its parent chain.
    fn is_within(&self, entity: &Entity, region_id: &str) -> bool {
        let mut cursor = entity.parent_region_id();
        let mut hops = 0;
        while let Some(parent) = cursor {
            if parent == region_id {
                return true;
            }
            hops += 1;
            if hops > self.graph.entity_count() {
                return false;
            }
            cursor = self.graph.get(parent).and_then(Entity::parent_region_id);
        }
        false
    }

    fn record(&self, pose: &Pose, entity: &Entity) -> Option<ViewRecord> {
        let at = self.graph.position(entity.id())?;
        let precise = self.graph.has_precise_position(entity.id());
        let height = self.graph.height(entity.id());

        let ground = distance(pose.location(), at);
        let dist = ground.hypot(height);
        let pos2d = to_camera_frame(pose, at);
        let pos3d = [pos2d.x, pos2d.y, height];

        let has_object = entity.kind() == EntityKind::Region
            && self
                .graph
                .children(entity.id())
                .any(|child| child.kind() == EntityKind::Object);

        Some(ViewRecord {
            id: entity.id().to_string(),
            kind: Some(entity.kind()),
            type_name: entity.type_name().to_string(),
            unique_name: entity.unique_name().map(str::to_string),
            parent_region_id: entity.parent_region_id().map(str::to_string),
            has_object,
            desc: entity.desc().to_string(),
            dist,
            radius: entity.radius(),
            cam_pos: classify_position(self.policy, pos3d, dist, precise),
            cam_dist: classify_distance(self.policy, dist, precise),
            pos2d: [pos2d.x, pos2d.y],
            pos3d,
        })
    }
}

fn sort_records(records: &mut [ViewRecord]) {
    records.sort_by(|a, b| a.dist.total_cmp(&b.dist).then_with(|| a.id.cmp(&b.id)));
}

// ============================================================================
// 4. Classification
// ============================================================================

/// Bucket a camera-frame position into the 3x3 grid.
pub fn classify_position(policy: &ViewPolicy, pos3d: [f64; 3], dist: f64, precise: bool) -> CamPos {
    if !precise || dist < COINCIDENT_EPSILON || dist > policy.view_radius {
        return CamPos::None;
    }
    let [x, y, z] = pos3d;
    let half = policy.front_half_angle;

    #[derive(PartialEq)]
    enum Col {
        Left,
        Center,
        Right,
    }
    #[derive(PartialEq)]
    enum Row {
        Lower,
        Middle,
        Upper,
    }

    let planar = x.hypot(y);
    let col = if planar < COINCIDENT_EPSILON {
        Col::Center
    } else {
        // Exactly behind falls on the right whatever the sign of zero.
        let x = if x == 0.0 { 0.0 } else { x };
        let azimuth = x.atan2(y).to_degrees();
        if azimuth.abs() <= half {
            Col::Center
        } else if azimuth > 0.0 {
            Col::Right
        } else {
            Col::Left
        }
    };
    let elevation = z.atan2(planar).to_degrees();
    let row = if elevation > half {
        Row::Upper
    } else if elevation < -half {
        Row::Lower
    } else {
        Row::Middle
    };

    match (row, col) {
        (Row::Middle, Col::Center) => CamPos::Front,
        (Row::Middle, Col::Left) => CamPos::Left,
        (Row::Middle, Col::Right) => CamPos::Right,
        (Row::Upper, Col::Center) => CamPos::Upper,
        (Row::Upper, Col::Left) => CamPos::UpperLeft,
        (Row::Upper, Col::Right) => CamPos::UpperRight,
        (Row::Lower, Col::Center) => CamPos::Lower,
        (Row::Lower, Col::Left) => CamPos::LowerLeft,
        (Row::Lower, Col::Right) => CamPos::LowerRight,
    }
}

/// Bucket a distance by its ratio to the view radius.
pub fn classify_distance(policy: &ViewPolicy, dist: f64, precise: bool) -> CamDist {
    if !precise {
        return CamDist::Unknown;
    }
    let ratio = dist / policy.view_radius;
    if ratio < policy.very_close {
        CamDist::VeryClose
    } else if ratio < policy.close {
        CamDist::Close
    } else if ratio < policy.in_distance {
        CamDist::InDistance
    } else {
        CamDist::VeryFarAway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NewEntity, NewObject, NewRegion, Offset3};
    use mapspace_geo::{offset_latlng, LatLng};

    fn policy() -> ViewPolicy {
        ViewPolicy::default()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(policy().validate().is_ok());
        let bad = ViewPolicy { close: 0.05, ..ViewPolicy::default() };
        assert!(bad.validate().is_err());
        let bad = ViewPolicy { view_radius: 0.0, ..ViewPolicy::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_position_grid() {
        let p = policy();
        assert_eq!(classify_position(&p, [0.0, 10.0, 0.0], 10.0, true), CamPos::Front);
        assert_eq!(classify_position(&p, [10.0, 0.0, 0.0], 10.0, true), CamPos::Right);
        assert_eq!(classify_position(&p, [-10.0, 0.0, 0.0], 10.0, true), CamPos::Left);
        assert_eq!(classify_position(&p, [0.0, 10.0, 10.0], 14.1, true), CamPos::Upper);
        assert_eq!(classify_position(&p, [10.0, 10.0, -10.0], 17.3, true), CamPos::LowerRight);
        assert_eq!(classify_position(&p, [-10.0, 10.0, 10.0], 17.3, true), CamPos::UpperLeft);
        assert_eq!(classify_position(&p, [0.0, 0.0, 5.0], 5.0, true), CamPos::Upper);
        // Boundary of the center column is inclusive
        let edge = 19.9f64.to_radians();
        assert_eq!(
            classify_position(&p, [edge.sin() * 10.0, edge.cos() * 10.0, 0.0], 10.0, true),
            CamPos::Front
        );
    }

    #[test]
    fn test_position_directly_behind_is_stable() {
        let p = policy();
        assert_eq!(classify_position(&p, [0.0, -10.0, 0.0], 10.0, true), CamPos::Right);
        assert_eq!(classify_position(&p, [-0.0, -10.0, 0.0], 10.0, true), CamPos::Right);
        assert_eq!(classify_position(&p, [-1.0, -10.0, 0.0], 10.05, true), CamPos::Left);
        assert_eq!(classify_position(&p, [1.0, -10.0, 0.0], 10.05, true), CamPos::Right);
    }

    #[test]
    fn test_position_none_cases() {
        let p = policy();
        assert_eq!(classify_position(&p, [0.0, 0.0, 0.0], 0.0, true), CamPos::None);
        assert_eq!(classify_position(&p, [0.0, 300.0, 0.0], 300.0, true), CamPos::None);
        assert_eq!(classify_position(&p, [0.0, 10.0, 0.0], 10.0, false), CamPos::None);
    }

    #[test]
    fn test_distance_buckets_are_total_and_monotonic() {
        let p = policy();
        let mut last = CamDist::VeryClose;
        for step in 0..=500 {
            let d = step as f64;
            let bucket = classify_distance(&p, d, true);
            assert_ne!(bucket, CamDist::Unknown);
            assert!(bucket >= last, "bucket went backwards at {}", d);
            last = bucket;
        }
        assert_eq!(classify_distance(&p, 19.9, true), CamDist::VeryClose);
        assert_eq!(classify_distance(&p, 20.0, true), CamDist::Close);
        assert_eq!(classify_distance(&p, 100.0, true), CamDist::InDistance);
        assert_eq!(classify_distance(&p, 200.0, true), CamDist::VeryFarAway);
        assert_eq!(classify_distance(&p, 10.0, false), CamDist::Unknown);
    }

    fn sample_world() -> (WorldGraph, String, String) {
        let mut graph = WorldGraph::new();
        let origin = LatLng::new(35.0, 139.0);
        let house = graph
            .add(NewEntity::Region(NewRegion {
                type_name: "house".into(),
                desc: "a wooden house".into(),
                location: Some(origin),
                radius: Some(30.0),
                ..Default::default()
            }))
            .unwrap()
            .id;
        let lamp = graph
            .add(NewEntity::Object(NewObject {
                parent_region_id: Some(house.clone()),
                type_name: "lamp".into(),
                desc: "a tall lamp".into(),
                offset: Some(Offset3 { x: 0.0, y: 10.0, z: 0.0 }),
                ..Default::default()
            }))
            .unwrap()
            .id;
        (graph, house, lamp)
    }

    #[test]
    fn test_view_orders_and_classifies() {
        let (graph, house, lamp) = sample_world();
        let p = policy();
        let projector = ViewProjector::new(&graph, &p);

        let records = projector.view(&Pose::new(35.0, 139.0, 0.0));
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![house.as_str(), lamp.as_str()]);
        assert_eq!(records[0].cam_pos, CamPos::None);
        assert!(records[0].has_object);
        assert_eq!(records[1].cam_pos, CamPos::Front);
        assert_eq!(records[1].cam_dist, CamDist::VeryClose);
        assert!((records[1].pos2d[1] - 10.0).abs() < 0.01);

        // Facing south the lamp is behind: horizontally off-center
        let behind = projector.view(&Pose::new(35.0, 139.0, 180.0));
        assert_ne!(behind[1].cam_pos, CamPos::Front);
    }

    #[test]
    fn test_view_info_and_region_map() {
        let (mut graph, house, lamp) = sample_world();
        let shed = graph
            .add(NewEntity::Region(NewRegion {
                type_name: "shed".into(),
                desc: "a tool shed".into(),
                location: Some(offset_latlng(LatLng::new(35.0, 139.0), 60.0, 0.0)),
                radius: Some(5.0),
                ..Default::default()
            }))
            .unwrap()
            .id;
        let p = policy();
        let projector = ViewProjector::new(&graph, &p);
        let pose = Pose::new(35.0, 139.0, 90.0);

        let info = projector.view_info(&pose);
        assert_eq!(info.region_desc, "a wooden house");
        assert_eq!(info.regions.len(), 2);
        assert_eq!(info.objects.len(), 1);
        assert_eq!(info.objects[0].id, lamp);

        let map = projector.region_map(&pose);
        let excluded: Vec<&str> = map.exclude_regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(excluded, vec![shed.as_str()]);
        assert_eq!(map.reachable_objects.len(), 1);
        assert_eq!(map.reachable_objects[0].id, lamp);
        assert_eq!(map.exclude_regions[0].cam_pos, CamPos::Front);
        assert!(!excluded.contains(&house.as_str()));
    }

    #[test]
    fn test_record_serializes_wire_names() {
        let (graph, _, _) = sample_world();
        let p = policy();
        let records = ViewProjector::new(&graph, &p).view(&Pose::new(35.0, 139.0, 0.0));
        let json = serde_json::to_value(&records[1]).unwrap();
        assert_eq!(json["camPos"], "front");
        assert_eq!(json["camDist"], "very close");
        assert_eq!(json["typeName"], "lamp");
        assert!(json.get("kind").is_none());
    }
}
