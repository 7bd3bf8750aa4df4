//! # MapSpace Geo - Geographic Arithmetic for the World Overlay
//!
//! Leaf crate for everything that turns latitude/longitude into meters and
//! angles: distances, bearings, destination points, the observer camera frame,
//! and an R-tree of resolved positions for proximity queries.
//!
//! ## Modules
//! - `coords` - Haversine metrics, equirectangular local plane, camera frame
//! - `spatial_index` - R-tree wrapper for radius / nearest queries

pub mod coords;
pub mod spatial_index;

pub use coords::{
    bearing_between, destination_point, distance, frame_to_enu, interpolate, normalize_bearing,
    offset_latlng, rotate_to_frame, to_camera_frame, to_local, wrap_180, LatLng, Pose,
};
pub use spatial_index::{GeoSpatialIndex, IndexedPosition};
