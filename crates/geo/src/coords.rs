//! # Coordinate Transforms
//!
//! Geographic arithmetic for the world overlay: great-circle distance,
//! bearings, destination points, and the observer-relative camera frame.
//!
//! ## Pipeline
//! ```text
//! Geographic (WGS84)  →  Local tangent plane  →  Camera frame
//!   lat/lng degrees       east/north meters       x = right, y = forward
//! ```
//!
//! ## Table of Contents
//! 1. LatLng / Pose - value types
//! 2. Great-circle metrics (haversine)
//! 3. Equirectangular local plane
//! 4. Camera frame

use geo::{Bearing, Destination, Distance, Haversine, Point};
use glam::DVec2;
use serde::{Deserialize, Serialize};

// ============================================================================
// 1. LatLng / Pose - value types
// ============================================================================

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn to_point(self) -> Point<f64> {
        // geo points are (x = lng, y = lat)
        Point::new(self.lng, self.lat)
    }

    fn from_point(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }

    /// `"lat,lng"` as the upstream map provider expects it in query strings.
    pub fn to_query_string(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

/// Observer pose: position plus heading. Bearing is in degrees,
/// 0 = geographic north, 90 = east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub lat: f64,
    pub lng: f64,
    pub bearing: f64,
}

impl Pose {
    pub fn new(lat: f64, lng: f64, bearing: f64) -> Self {
        Self {
            lat,
            lng,
            bearing: normalize_bearing(bearing),
        }
    }

    pub fn at(location: LatLng, bearing: f64) -> Self {
        Self::new(location.lat, location.lng, bearing)
    }

    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Whether all three components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.bearing.is_finite()
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_180(degrees: f64) -> f64 {
    let wrapped = normalize_bearing(degrees);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

// ============================================================================
// 2. Great-circle metrics (haversine)
// ============================================================================

/// Great-circle distance in meters.
pub fn distance(a: LatLng, b: LatLng) -> f64 {
    if a == b {
        return 0.0;
    }
    let meters: f64 = Haversine::distance(a.to_point(), b.to_point());
    meters.max(0.0)
}

/// Initial bearing from `a` towards `b`, in `[0, 360)`.
/// Coincident points have no defined bearing and yield 0.
pub fn bearing_between(a: LatLng, b: LatLng) -> f64 {
    if a == b {
        return 0.0;
    }
    let degrees: f64 = Haversine::bearing(a.to_point(), b.to_point());
    normalize_bearing(degrees)
}

/// Point reached by travelling `meters` from `origin` along `bearing`.
pub fn destination_point(origin: LatLng, bearing: f64, meters: f64) -> LatLng {
    if meters == 0.0 {
        return origin;
    }
    let point: Point<f64> =
        Haversine::destination(origin.to_point(), normalize_bearing(bearing), meters);
    LatLng::from_point(point)
}

/// Linear interpolation between two positions, `ratio` clamped to `[0, 1]`.
pub fn interpolate(a: LatLng, b: LatLng, ratio: f64) -> LatLng {
    let t = ratio.clamp(0.0, 1.0);
    LatLng::new(a.lat + (b.lat - a.lat) * t, a.lng + (b.lng - a.lng) * t)
}

// ============================================================================
// 3. Equirectangular local plane
// ============================================================================

/// Earth radius in meters (WGS84 mean)
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Approximate geographic → local `(east, north)` meters around `origin`.
/// Accurate within ~0.5% for areas < 500 km from origin at mid-latitudes.
pub fn to_local(origin: LatLng, target: LatLng) -> DVec2 {
    let origin_lat_rad = origin.lat.to_radians();
    let dlng = target.lng - origin.lng;
    let dlng = if dlng.abs() > 180.0 { wrap_180(dlng) } else { dlng };
    let east = dlng.to_radians() * EARTH_RADIUS * origin_lat_rad.cos();
    let north = (target.lat - origin.lat).to_radians() * EARTH_RADIUS;
    DVec2::new(east, north)
}

/// Inverse of [`to_local`]: apply an `(east, north)` meter offset to `origin`.
pub fn offset_latlng(origin: LatLng, east: f64, north: f64) -> LatLng {
    let lat = origin.lat + (north / EARTH_RADIUS).to_degrees();
    let cos_lat = origin.lat.to_radians().cos();
    let lng = if cos_lat.abs() < f64::EPSILON {
        origin.lng
    } else {
        origin.lng + (east / (EARTH_RADIUS * cos_lat)).to_degrees()
    };
    let lng = if lng.abs() > 180.0 { wrap_180(lng) } else { lng };
    LatLng::new(lat, lng)
}

/// Rotate a frame-local offset (`x` = right, `y` = front) whose front faces
/// `front_bearing` into `(east, north)` meters.
pub fn frame_to_enu(local: DVec2, front_bearing: f64) -> DVec2 {
    let theta = front_bearing.to_radians();
    let (sin, cos) = theta.sin_cos();
    DVec2::new(
        local.x * cos + local.y * sin,
        -local.x * sin + local.y * cos,
    )
}

// ============================================================================
// 4. Camera frame
// ============================================================================

/// Rotate an `(east, north)` offset by `-bearing` so the heading becomes +Y.
/// Result is `(x = right, y = forward)` in meters.
pub fn rotate_to_frame(enu: DVec2, bearing: f64) -> DVec2 {
    let theta = bearing.to_radians();
    let (sin, cos) = theta.sin_cos();
    DVec2::new(
        enu.x * cos - enu.y * sin,
        enu.x * sin + enu.y * cos,
    )
}

/// Planar camera-frame position of `target` as seen from `pose`.
pub fn to_camera_frame(pose: &Pose, target: LatLng) -> DVec2 {
    rotate_to_frame(to_local(pose.location(), target), pose.bearing)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKYO: LatLng = LatLng::new(35.0, 139.0);

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(0.0), 0.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(725.0), 5.0);
        assert_eq!(wrap_180(270.0), -90.0);
        assert_eq!(wrap_180(180.0), 180.0);
    }

    #[test]
    fn test_distance_degenerate_and_symmetric() {
        assert_eq!(distance(TOKYO, TOKYO), 0.0);

        let north = offset_latlng(TOKYO, 0.0, 100.0);
        let d1 = distance(TOKYO, north);
        let d2 = distance(north, TOKYO);
        assert!((d1 - 100.0).abs() < 0.5, "got {}", d1);
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let north = offset_latlng(TOKYO, 0.0, 50.0);
        let east = offset_latlng(TOKYO, 50.0, 0.0);
        let south = offset_latlng(TOKYO, 0.0, -50.0);

        assert!(bearing_between(TOKYO, north).min(360.0 - bearing_between(TOKYO, north)) < 0.1);
        assert!((bearing_between(TOKYO, east) - 90.0).abs() < 0.1);
        assert!((bearing_between(TOKYO, south) - 180.0).abs() < 0.1);
        assert_eq!(bearing_between(TOKYO, TOKYO), 0.0);
    }

    #[test]
    fn test_destination_roundtrips_distance_and_bearing() {
        let dest = destination_point(TOKYO, 45.0, 120.0);
        assert!((distance(TOKYO, dest) - 120.0).abs() < 0.5);
        assert!((bearing_between(TOKYO, dest) - 45.0).abs() < 0.5);
        assert_eq!(destination_point(TOKYO, 10.0, 0.0), TOKYO);
    }

    #[test]
    fn test_local_plane_inverse() {
        let target = offset_latlng(TOKYO, 30.0, -40.0);
        let local = to_local(TOKYO, target);
        assert!((local.x - 30.0).abs() < 1e-6);
        assert!((local.y + 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_frame_forward_is_positive_y() {
        let east = offset_latlng(TOKYO, 10.0, 0.0);

        // Facing north: east is to the right
        let cam = to_camera_frame(&Pose::at(TOKYO, 0.0), east);
        assert!((cam.x - 10.0).abs() < 1e-6 && cam.y.abs() < 1e-6);

        // Facing east: east is straight ahead
        let cam = to_camera_frame(&Pose::at(TOKYO, 90.0), east);
        assert!(cam.x.abs() < 1e-6 && (cam.y - 10.0).abs() < 1e-6);

        // Facing west: east is behind
        let cam = to_camera_frame(&Pose::at(TOKYO, 270.0), east);
        assert!((cam.y + 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_to_enu_respects_front_angle() {
        let enu = frame_to_enu(DVec2::new(0.0, 1.0), 90.0);
        assert!((enu.x - 1.0).abs() < 1e-9 && enu.y.abs() < 1e-9);

        // Right of an east-facing frame points south
        let enu = frame_to_enu(DVec2::new(1.0, 0.0), 90.0);
        assert!(enu.x.abs() < 1e-9 && (enu.y + 1.0).abs() < 1e-9);

        // frame_to_enu and rotate_to_frame are inverses for the same angle
        let back = rotate_to_frame(frame_to_enu(DVec2::new(3.0, 4.0), 33.0), 33.0);
        assert!((back.x - 3.0).abs() < 1e-9 && (back.y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_plane_wraps_antimeridian() {
        let east_side = LatLng::new(0.0, 179.9999);
        let west_side = LatLng::new(0.0, -179.9999);
        let local = to_local(east_side, west_side);
        assert!(local.x > 0.0 && local.x < 30.0, "{:?}", local);
        assert!(local.y.abs() < 1e-9);

        let back = offset_latlng(east_side, local.x, local.y);
        assert!(back.lng >= -180.0 && back.lng <= 180.0);
        assert!(distance(back, west_side) < 1e-3);
    }

    #[test]
    fn test_interpolate_clamps_ratio() {
        let b = LatLng::new(36.0, 140.0);
        assert_eq!(interpolate(TOKYO, b, 0.5), LatLng::new(35.5, 139.5));
        assert_eq!(interpolate(TOKYO, b, 2.0), b);
        assert_eq!(interpolate(TOKYO, b, -1.0), TOKYO);
    }

    #[test]
    fn test_pose_serde_names() {
        let pose = Pose::new(30.0, 130.0, -10.0);
        let json = serde_json::to_value(pose).unwrap();
        assert_eq!(json["bearing"], 350.0);
        assert_eq!(json["lat"], 30.0);
    }
}
