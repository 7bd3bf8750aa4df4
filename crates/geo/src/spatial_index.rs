//! # Spatial Index
//!
//! R-tree wrapper for runtime proximity queries on resolved world positions.
//! Entries live in (lng, lat) degree space; radius queries use a degree
//! envelope as the prefilter and the haversine metric for the exact check.
//!
//! ## Table of Contents
//! 1. GeoSpatialIndex - R-tree wrapper
//! 2. IndexedPosition - R-tree entry

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::coords::{distance, LatLng, EARTH_RADIUS};

// ============================================================================
// 1. GeoSpatialIndex - R-tree wrapper
// ============================================================================

/// R-tree of entity positions keyed by entity id.
pub struct GeoSpatialIndex {
    tree: RTree<IndexedPosition>,
}

impl Default for GeoSpatialIndex {
    fn default() -> Self {
        Self {
            tree: RTree::new(),
        }
    }
}

impl GeoSpatialIndex {
    /// Create a new empty spatial index
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load positions into the R-tree (much faster than individual inserts)
    pub fn bulk_load(entries: Vec<IndexedPosition>) -> Self {
        tracing::trace!(count = entries.len(), "Bulk-loading spatial index");
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Insert a single position
    pub fn insert(&mut self, entry: IndexedPosition) {
        self.tree.insert(entry);
    }

    /// Remove every entry with the given id. Returns how many were removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let doomed: Vec<IndexedPosition> = self
            .tree
            .iter()
            .filter(|entry| entry.id == id)
            .cloned()
            .collect();
        doomed
            .iter()
            .filter(|entry| self.tree.remove(entry).is_some())
            .count()
    }

    /// All entries within `meters` of `center`, closest first (ties by id).
    pub fn within_radius(&self, center: LatLng, meters: f64) -> Vec<(&IndexedPosition, f64)> {
        if meters.is_nan() || meters < 0.0 {
            return Vec::new();
        }
        let dlat = (meters / EARTH_RADIUS).to_degrees();
        let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
        let dlng = (dlat / cos_lat).min(180.0);

        let (south, north) = (center.lat - dlat, center.lat + dlat);

        // Longitude bands to scan; a box crossing ±180° wraps onto the far side.
        let (west, east) = (center.lng - dlng, center.lng + dlng);
        let mut bands = Vec::with_capacity(2);
        if dlng >= 180.0 {
            bands.push((-180.0, 180.0));
        } else {
            bands.push((west.max(-180.0), east.min(180.0)));
            if west < -180.0 {
                bands.push((west + 360.0, 180.0));
            }
            if east > 180.0 {
                bands.push((-180.0, east - 360.0));
            }
        }

        let mut hits: Vec<(&IndexedPosition, f64)> = bands
            .into_iter()
            .flat_map(|(lo, hi)| {
                self.tree
                    .locate_in_envelope(&AABB::from_corners([lo, south], [hi, north]))
            })
            .map(|entry| (entry, distance(center, entry.location())))
            .filter(|(_, d)| *d <= meters)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        hits
    }

    /// Nearest entry to `center` (degree-space metric).
    pub fn nearest(&self, center: LatLng) -> Option<&IndexedPosition> {
        self.tree.nearest_neighbor(&[center.lng, center.lat])
    }

    /// Number of indexed positions
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

// ============================================================================
// 2. IndexedPosition - R-tree entry
// ============================================================================

/// A resolved entity position in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPosition {
    /// Entity id this position belongs to
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

impl IndexedPosition {
    pub fn new(id: impl Into<String>, location: LatLng) -> Self {
        Self {
            id: id.into(),
            lat: location.lat,
            lng: location.lng,
        }
    }

    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl RTreeObject for IndexedPosition {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for IndexedPosition {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.lng - point[0];
        let dy = self.lat - point[1];
        dx * dx + dy * dy
    }
}
