//! World Graph - Regions and objects anchored to the map
//!
//! ## Table of Contents
//! 1. Entity types (Region, WorldObject, Entity)
//! 2. Insertion types (NewRegion, NewObject, ChangePatch)
//! 3. WorldGraph - arena, position resolution, spatial lookup
//! 4. Mutations (add, remove, change, reparent, expiration sweep)
//! 5. Name resolution
//!
//! Entities live in an arena keyed by id; parent links are ids, never owning
//! pointers. Every mutation is staged on a copy of the arena and only
//! committed once all positions still resolve.

use glam::DVec2;
use mapspace_geo::{distance, frame_to_enu, offset_latlng, GeoSpatialIndex, IndexedPosition, LatLng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{Result, WorldError};
use crate::status::AddRemoveStatus;

/// Default radius for regions created without one (meters)
pub const DEFAULT_REGION_RADIUS: f64 = 20.0;

// ============================================================================
// 1. Entity types
// ============================================================================

/// Which arm of [`Entity`] a record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Region,
    Object,
}

/// Planar offset in a parent region's frame (x = right, y = front), meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset2 {
    pub x: f64,
    pub y: f64,
}

/// Offset in a parent region's frame with height (z = up), meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// How a region is pinned to the map: exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Anchor {
    /// Absolute WGS84 position
    Location(LatLng),
    /// Relative to the parent region's frame
    Offset(Offset2),
}

/// A named area that may contain child regions and objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub parent_region_id: Option<String>,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub desc: String,
    #[serde(flatten)]
    pub anchor: Anchor,
    /// Containment / visibility extent in meters
    pub radius: f64,
    /// Compass bearing the region's "front" faces; north when absent
    pub front_angle: Option<f64>,
}

/// A point-like entity that always belongs to exactly one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldObject {
    pub id: String,
    pub parent_region_id: String,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub desc: String,
    /// Absent when the object is merely "somewhere in" its region
    pub offset: Option<Offset3>,
    pub radius: Option<f64>,
    /// Unix seconds after which the object is swept
    pub expiration_epoch: Option<i64>,
}

/// Tagged union of everything the graph stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Entity {
    Region(Region),
    Object(WorldObject),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Region(r) => &r.id,
            Entity::Object(o) => &o.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Region(_) => EntityKind::Region,
            Entity::Object(_) => EntityKind::Object,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Entity::Region(r) => &r.type_name,
            Entity::Object(o) => &o.type_name,
        }
    }

    pub fn unique_name(&self) -> Option<&str> {
        match self {
            Entity::Region(r) => r.unique_name.as_deref(),
            Entity::Object(o) => o.unique_name.as_deref(),
        }
    }

    pub fn desc(&self) -> &str {
        match self {
            Entity::Region(r) => &r.desc,
            Entity::Object(o) => &o.desc,
        }
    }

    pub fn parent_region_id(&self) -> Option<&str> {
        match self {
            Entity::Region(r) => r.parent_region_id.as_deref(),
            Entity::Object(o) => Some(&o.parent_region_id),
        }
    }

    /// Extent used for display; objects without one report 0.
    pub fn radius(&self) -> f64 {
        match self {
            Entity::Region(r) => r.radius,
            Entity::Object(o) => o.radius.unwrap_or(0.0),
        }
    }

    /// Name to show a user: the unique name when present, else the type.
    pub fn display_name(&self) -> &str {
        self.unique_name().unwrap_or_else(|| self.type_name())
    }

    pub fn as_region(&self) -> Option<&Region> {
        match self {
            Entity::Region(r) => Some(r),
            Entity::Object(_) => None,
        }
    }

    fn names_match(&self, query: &str) -> bool {
        same_name(self.type_name(), query)
            || self.unique_name().is_some_and(|name| same_name(name, query))
    }

    fn set_parent(&mut self, parent: String) {
        match self {
            Entity::Region(r) => r.parent_region_id = Some(parent),
            Entity::Object(o) => o.parent_region_id = parent,
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

// ============================================================================
// 2. Insertion types
// ============================================================================

/// Fields for a new region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegion {
    pub parent_region_id: Option<String>,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub desc: String,
    pub location: Option<LatLng>,
    pub offset: Option<Offset2>,
    pub radius: Option<f64>,
    pub front_angle: Option<f64>,
}

/// Fields for a new object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObject {
    pub parent_region_id: Option<String>,
    pub type_name: String,
    pub unique_name: Option<String>,
    pub desc: String,
    pub offset: Option<Offset3>,
    pub radius: Option<f64>,
    pub expiration_epoch: Option<i64>,
}

/// Either insertion spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NewEntity {
    Region(NewRegion),
    Object(NewObject),
}

impl NewEntity {
    fn kind(&self) -> EntityKind {
        match self {
            NewEntity::Region(_) => EntityKind::Region,
            NewEntity::Object(_) => EntityKind::Object,
        }
    }
}

/// Fields `change` may rewrite. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePatch {
    pub desc: Option<String>,
    pub type_name: Option<String>,
    pub unique_name: Option<String>,
    pub parent_region_id: Option<String>,
}

impl ChangePatch {
    pub fn is_empty(&self) -> bool {
        self.desc.is_none()
            && self.type_name.is_none()
            && self.unique_name.is_none()
            && self.parent_region_id.is_none()
    }
}

/// Result of a successful `add`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    /// `Added` for a fresh entity, `Changed` when a same-named one was updated
    pub status: AddRemoveStatus,
    pub id: String,
    pub kind: EntityKind,
}

// ============================================================================
// 3. WorldGraph
// ============================================================================

/// One user's world: the entity arena plus resolved positions.
#[derive(Default)]
pub struct WorldGraph {
    entities: HashMap<String, Entity>,
    positions: HashMap<String, LatLng>,
    index: GeoSpatialIndex,
}

impl WorldGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an entity by id
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.entities.get(id).and_then(Entity::as_region)
    }

    /// All entities, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Direct children (regions and objects) of a region
    pub fn children<'a>(&'a self, region_id: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .values()
            .filter(move |e| e.parent_region_id() == Some(region_id))
    }

    pub fn has_children(&self, region_id: &str) -> bool {
        self.children(region_id).next().is_some()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Cached absolute position of an entity.
    pub fn position(&self, id: &str) -> Option<LatLng> {
        self.positions.get(id).copied()
    }

    /// Whether the entity has its own position rather than borrowing its region's.
    pub fn has_precise_position(&self, id: &str) -> bool {
        match self.entities.get(id) {
            Some(Entity::Object(o)) => o.offset.is_some(),
            Some(Entity::Region(_)) => true,
            None => false,
        }
    }

    /// Height above the ground in meters (objects only).
    pub fn height(&self, id: &str) -> f64 {
        match self.entities.get(id) {
            Some(Entity::Object(WorldObject { offset: Some(off), .. })) => off.z,
            _ => 0.0,
        }
    }

    /// Nesting depth: 0 for root regions.
    pub fn depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut seen = HashSet::new();
        let mut current = self.entities.get(id);
        while let Some(parent) = current.and_then(Entity::parent_region_id) {
            if !seen.insert(parent) {
                break;
            }
            depth += 1;
            current = self.entities.get(parent);
        }
        depth
    }

    /// Walk the offset chain to the nearest absolute anchor and compose the
    /// offsets into a single position.
    pub fn resolve_absolute_position(&self, id: &str) -> Result<LatLng> {
        resolve_in(&self.entities, id)
    }

    /// Entities whose position lies within `meters` of `center`, closest first.
    pub fn nearby(&self, center: LatLng, meters: f64) -> Vec<(&Entity, f64)> {
        self.index
            .within_radius(center, meters)
            .into_iter()
            .filter_map(|(hit, d)| self.entities.get(&hit.id).map(|e| (e, d)))
            .collect()
    }

    /// The entity closest to `center`, with its distance in meters.
    pub fn nearest(&self, center: LatLng) -> Option<(&Entity, f64)> {
        let hit = self.index.nearest(center)?;
        self.entities
            .get(&hit.id)
            .map(|e| (e, distance(center, hit.location())))
    }

    /// Regions whose extent contains `position`, innermost first.
    pub fn regions_containing(&self, position: LatLng) -> Vec<&Region> {
        let mut hits: Vec<(&Region, usize)> = self
            .entities
            .values()
            .filter_map(Entity::as_region)
            .filter(|r| {
                self.position(&r.id)
                    .is_some_and(|at| distance(at, position) <= r.radius)
            })
            .map(|r| (r, self.depth(&r.id)))
            .collect();
        hits.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.radius.total_cmp(&b.0.radius))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.into_iter().map(|(r, _)| r).collect()
    }

    /// Innermost region containing `position`.
    pub fn region_at(&self, position: LatLng) -> Option<&Region> {
        self.regions_containing(position).into_iter().next()
    }

    /// Install `next` as the arena if every entity in it still resolves.
    fn commit(&mut self, next: HashMap<String, Entity>) -> Result<()> {
        let mut positions = HashMap::with_capacity(next.len());
        for id in next.keys() {
            positions.insert(id.clone(), resolve_in(&next, id)?);
        }
        if self.index.is_empty() {
            self.index = GeoSpatialIndex::bulk_load(
                positions
                    .iter()
                    .map(|(id, at)| IndexedPosition::new(id.clone(), *at))
                    .collect(),
            );
        } else {
            // Only entries that vanished or moved are touched.
            for (id, at) in &self.positions {
                if positions.get(id) != Some(at) {
                    self.index.remove(id);
                }
            }
            for (id, at) in &positions {
                if self.positions.get(id) != Some(at) {
                    self.index.insert(IndexedPosition::new(id.clone(), *at));
                }
            }
        }
        self.entities = next;
        self.positions = positions;
        Ok(())
    }
}

fn resolve_in(entities: &HashMap<String, Entity>, id: &str) -> Result<LatLng> {
    let mut enu = DVec2::ZERO;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = entities
        .get(id)
        .ok_or_else(|| WorldError::NotFound(id.to_string()))?;

    loop {
        if !seen.insert(current.id()) {
            return Err(WorldError::Unresolvable(format!("{} (cycle at {})", id, current.id())));
        }

        let local = match current {
            Entity::Region(Region { anchor: Anchor::Location(at), .. }) => {
                return Ok(offset_latlng(*at, enu.x, enu.y));
            }
            Entity::Region(Region { anchor: Anchor::Offset(off), .. }) => Some(DVec2::new(off.x, off.y)),
            Entity::Object(o) => o.offset.map(|off| DVec2::new(off.x, off.y)),
        };

        let parent = current
            .parent_region_id()
            .and_then(|pid| entities.get(pid))
            .and_then(Entity::as_region)
            .ok_or_else(|| WorldError::Unresolvable(format!("{} (broken parent link at {})", id, current.id())))?;

        if let Some(local) = local {
            enu += frame_to_enu(local, parent.front_angle.unwrap_or(0.0));
        }
        current = entities
            .get(&parent.id)
            .ok_or_else(|| WorldError::Unresolvable(id.to_string()))?;
    }
}

// ============================================================================
// 4. Mutations
// ============================================================================

impl WorldGraph {
    /// Insert a region or object. An entity whose unique name is already taken by
    /// an entity of the same kind updates that entity instead.
    pub fn add(&mut self, spec: NewEntity) -> Result<AddOutcome> {
        let kind = spec.kind();

        // Validated in full before a duplicate name can turn this into an update.
        let id = uuid::Uuid::new_v4().to_string();
        let entity = match spec {
            NewEntity::Region(r) => Entity::Region(self.build_region(id.clone(), r)?),
            NewEntity::Object(o) => Entity::Object(self.build_object(id.clone(), o)?),
        };

        if let Some(name) = entity.unique_name() {
            let existing = self
                .entities
                .values()
                .find(|e| e.kind() == kind && e.unique_name().is_some_and(|n| same_name(n, name)))
                .map(|e| e.id().to_string());
            if let Some(existing) = existing {
                let patch = ChangePatch {
                    desc: Some(entity.desc().to_string()).filter(|d| !d.trim().is_empty()),
                    type_name: Some(entity.type_name().to_string()),
                    ..Default::default()
                };
                self.change(&existing, &patch)?;
                tracing::debug!(entity_id = %existing, "Unique name already present, updated instead");
                return Ok(AddOutcome { status: AddRemoveStatus::Changed, id: existing, kind });
            }
        }

        let mut next = self.entities.clone();
        next.insert(id.clone(), entity);
        self.commit(next)?;

        tracing::info!(entity_id = %id, kind = ?kind, "Entity added");
        Ok(AddOutcome { status: AddRemoveStatus::Added, id, kind })
    }

    fn build_region(&self, id: String, spec: NewRegion) -> Result<Region> {
        if spec.type_name.trim().is_empty() {
            return Err(WorldError::InvalidRequest("typeName is required".into()));
        }
        if let Some(parent) = &spec.parent_region_id {
            self.require_region(parent)?;
        }
        let anchor = match (spec.location, spec.offset) {
            (Some(_), Some(_)) => {
                return Err(WorldError::InvalidRequest(
                    "region takes either a location or an offset, not both".into(),
                ))
            }
            (Some(at), None) => Anchor::Location(at),
            (None, Some(off)) if spec.parent_region_id.is_some() => Anchor::Offset(off),
            (None, Some(_)) => {
                return Err(WorldError::InvalidRequest(
                    "offset-anchored region needs parentRegionId".into(),
                ))
            }
            (None, None) => {
                return Err(WorldError::InvalidRequest(
                    "region needs a location or an offset".into(),
                ))
            }
        };
        let radius = spec.radius.unwrap_or(DEFAULT_REGION_RADIUS);
        if !radius.is_finite() || radius < 0.0 {
            return Err(WorldError::InvalidRequest(format!("bad radius {}", radius)));
        }

        Ok(Region {
            id,
            parent_region_id: spec.parent_region_id,
            type_name: spec.type_name.trim().to_string(),
            unique_name: clean_name(spec.unique_name),
            desc: spec.desc,
            anchor,
            radius,
            front_angle: spec.front_angle.map(mapspace_geo::normalize_bearing),
        })
    }

    fn build_object(&self, id: String, spec: NewObject) -> Result<WorldObject> {
        if spec.type_name.trim().is_empty() {
            return Err(WorldError::InvalidRequest("typeName is required".into()));
        }
        let parent = spec
            .parent_region_id
            .ok_or_else(|| WorldError::InvalidRequest("object needs parentRegionId".into()))?;
        self.require_region(&parent)?;

        Ok(WorldObject {
            id,
            parent_region_id: parent,
            type_name: spec.type_name.trim().to_string(),
            unique_name: clean_name(spec.unique_name),
            desc: spec.desc,
            offset: spec.offset,
            radius: spec.radius,
            expiration_epoch: spec.expiration_epoch,
        })
    }

    /// `NotFound` if missing, `InvalidRequest` if the id names an object.
    fn require_region(&self, id: &str) -> Result<&Region> {
        match self.entities.get(id) {
            Some(Entity::Region(r)) => Ok(r),
            Some(Entity::Object(_)) => Err(WorldError::InvalidRequest(format!(
                "{} is an object and cannot contain entities",
                id
            ))),
            None => Err(WorldError::NotFound(id.to_string())),
        }
    }

    /// Remove one entity. Regions with live children are refused.
    pub fn remove(&mut self, id: &str) -> Result<Entity> {
        if !self.entities.contains_key(id) {
            return Err(WorldError::NotFound(id.to_string()));
        }
        if self.has_children(id) {
            return Err(WorldError::Blocked(format!("{} still contains entities", id)));
        }

        let mut next = self.entities.clone();
        let removed = next
            .remove(id)
            .ok_or_else(|| WorldError::NotFound(id.to_string()))?;
        self.commit(next)?;

        tracing::info!(entity_id = %id, "Entity removed");
        Ok(removed)
    }

    /// Rewrite descriptive fields and optionally move the entity.
    pub fn change(&mut self, id: &str, patch: &ChangePatch) -> Result<()> {
        let mut next = self.entities.clone();
        let kind = next
            .get(id)
            .map(Entity::kind)
            .ok_or_else(|| WorldError::NotFound(id.to_string()))?;

        if let Some(name) = patch.unique_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let taken = next
                .values()
                .any(|e| e.id() != id && e.kind() == kind && e.unique_name().is_some_and(|n| same_name(n, name)));
            if taken {
                return Err(WorldError::Blocked(format!("unique name '{}' is already in use", name)));
            }
        }
        if patch.type_name.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(WorldError::InvalidRequest("typeName cannot be empty".into()));
        }

        if let Some(entity) = next.get_mut(id) {
            let (type_name, unique_name, desc) = match entity {
                Entity::Region(r) => (&mut r.type_name, &mut r.unique_name, &mut r.desc),
                Entity::Object(o) => (&mut o.type_name, &mut o.unique_name, &mut o.desc),
            };
            if let Some(t) = &patch.type_name {
                *type_name = t.trim().to_string();
            }
            if let Some(u) = &patch.unique_name {
                *unique_name = clean_name(Some(u.clone()));
            }
            if let Some(d) = &patch.desc {
                *desc = d.clone();
            }
        }

        if let Some(parent) = &patch.parent_region_id {
            stage_reparent(&mut next, id, parent)?;
        }

        self.commit(next)?;
        tracing::info!(entity_id = %id, "Entity changed");
        Ok(())
    }

    /// Move an entity under another region, refusing cycles.
    pub fn reparent(&mut self, id: &str, new_parent: &str) -> Result<()> {
        let mut next = self.entities.clone();
        stage_reparent(&mut next, id, new_parent)?;
        self.commit(next)?;
        tracing::info!(entity_id = %id, parent = %new_parent, "Entity reparented");
        Ok(())
    }

    /// Drop objects whose expiration lies before `now` (unix seconds).
    pub fn sweep_expired(&mut self, now: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .entities
            .values()
            .filter_map(|e| match e {
                Entity::Object(o) if o.expiration_epoch.is_some_and(|t| t < now) => Some(o.id.clone()),
                _ => None,
            })
            .collect();
        if expired.is_empty() {
            return expired;
        }

        let mut next = self.entities.clone();
        for id in &expired {
            next.remove(id);
        }
        // Objects have no dependants, so removing them cannot break resolution
        if let Err(e) = self.commit(next) {
            tracing::error!(error = %e, "Expiration sweep rolled back");
            return Vec::new();
        }
        tracing::debug!(count = expired.len(), "Expired objects swept");
        expired
    }
}

fn stage_reparent(next: &mut HashMap<String, Entity>, id: &str, new_parent: &str) -> Result<()> {
    if !next.contains_key(id) {
        return Err(WorldError::NotFound(id.to_string()));
    }
    match next.get(new_parent) {
        Some(Entity::Region(_)) => {}
        Some(Entity::Object(_)) => {
            return Err(WorldError::InvalidRequest(format!("{} is not a region", new_parent)))
        }
        None => return Err(WorldError::NotFound(new_parent.to_string())),
    }

    // Walk the new parent's ancestors; meeting `id` means a cycle
    let mut cursor = Some(new_parent);
    let mut seen = HashSet::new();
    while let Some(current) = cursor {
        if current == id {
            return Err(WorldError::Cycle(id.to_string(), new_parent.to_string()));
        }
        if !seen.insert(current) {
            break;
        }
        cursor = next.get(current).and_then(Entity::parent_region_id);
    }

    if let Some(entity) = next.get_mut(id) {
        entity.set_parent(new_parent.to_string());
    }
    Ok(())
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

// ============================================================================
// 5. Name resolution
// ============================================================================

/// A resolved name candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    /// Distance from the observer in meters
    pub distance: f64,
}

/// Outcome of resolving an id or a list of names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Closest first, ties broken by id
    pub candidates: Vec<Candidate>,
    /// Whether the winning candidates matched on id or unique name
    pub exact: bool,
}

impl Resolution {
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// One unambiguous answer: an exact hit, or a single type match.
    pub fn unique(&self) -> Option<&Candidate> {
        match self.candidates.as_slice() {
            [only] => Some(only),
            [first, ..] if self.exact => Some(first),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl WorldGraph {
    /// Resolve `target_id` first, then `targets` by name.
    ///
    /// `targets[0]` names the entity; any further entries name enclosing
    /// regions and narrow the candidates. A unique-name match wins outright;
    /// otherwise entities whose type name matches and whose position lies
    /// within `search_radius` of `observer` are candidates.
    pub fn resolve(
        &self,
        target_id: Option<&str>,
        targets: &[String],
        observer: LatLng,
        search_radius: f64,
    ) -> Resolution {
        let distance_to = |id: &str| {
            self.position(id)
                .map(|at| distance(observer, at))
                .unwrap_or(f64::INFINITY)
        };

        if let Some(id) = target_id.map(str::trim).filter(|id| !id.is_empty()) {
            if self.entities.contains_key(id) {
                return Resolution {
                    candidates: vec![Candidate { id: id.to_string(), distance: distance_to(id) }],
                    exact: true,
                };
            }
        }

        let Some((name, context)) = targets.split_first() else {
            return Resolution::default();
        };
        let name = name.trim();
        if name.is_empty() {
            return Resolution::default();
        }
        if self.entities.contains_key(name) {
            return Resolution {
                candidates: vec![Candidate { id: name.to_string(), distance: distance_to(name) }],
                exact: true,
            };
        }

        let in_context = |e: &Entity| context.iter().all(|ctx| self.has_ancestor_named(e.id(), ctx));

        let exact: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| e.unique_name().is_some_and(|n| same_name(n, name)))
            .filter(|e| in_context(e))
            .collect();

        let (matches, is_exact) = if !exact.is_empty() {
            (exact, true)
        } else {
            let by_type = self
                .entities
                .values()
                .filter(|e| same_name(e.type_name(), name))
                .filter(|e| in_context(e))
                .filter(|e| distance_to(e.id()) <= search_radius)
                .collect();
            (by_type, false)
        };

        let mut candidates: Vec<Candidate> = matches
            .into_iter()
            .map(|e| Candidate { id: e.id().to_string(), distance: distance_to(e.id()) })
            .collect();
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));

        Resolution { candidates, exact: is_exact }
    }

    fn has_ancestor_named(&self, id: &str, name: &str) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = self.entities.get(id).and_then(Entity::parent_region_id);
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id) {
                return false;
            }
            match self.entities.get(parent_id) {
                Some(parent) if parent.names_match(name) || parent.id() == name => return true,
                Some(parent) => cursor = parent.parent_region_id(),
                None => return false,
            }
        }
        false
    }
}
