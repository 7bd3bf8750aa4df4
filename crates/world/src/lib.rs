//! # MapSpace World
//!
//! A persistent virtual world of named regions and objects pinned to real
//! geographic coordinates, seen through an observer's camera and traversed
//! along provider-sourced routes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  WorldStore          userId → Arc<RwLock<UserWorld>>             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  UserWorld                                                       │
//! │  ├── WorldGraph      regions / objects, offset chains, R-tree    │
//! │  ├── ViewProjector   camera frame, camPos / camDist buckets      │
//! │  ├── TargetResolver  name lookup, move toward target             │
//! │  └── RouteTracker    flattened path, proceed-by-distance         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mapspace_world::prelude::*;
//!
//! let store = WorldStore::new(ViewPolicy::default());
//! let reply = store.write("alice", |world| {
//!     world.add_object(PlaceObject {
//!         pose: Some(Pose::new(35.0, 139.0, 0.0)),
//!         type_name: "bench".into(),
//!         desc: "a stone bench".into(),
//!         position: Some("front".into()),
//!         ..Default::default()
//!     })
//! });
//! let seen = store.read("alice", |world| world.view_points(&Pose::new(35.0, 139.0, 0.0)));
//! ```

pub mod describe;
pub mod error;
pub mod graph;
pub mod route;
pub mod status;
pub mod store;
pub mod target;
pub mod view;

pub use error::{Result, WorldError};
pub use graph::{Entity, EntityKind, WorldGraph};
pub use route::{DirectionStep, RouteSource, RouteTracker, TrackerState};
pub use status::{AddRemoveStatus, CamDist, CamPos, LocStatus, MoveStatus};
pub use store::{UserWorld, WorldStore};
pub use view::{ViewPolicy, ViewProjector, ViewRecord};

// ============================================================================
// Prelude
// ============================================================================

pub mod prelude {
    pub use crate::describe::Language;
    pub use crate::error::{Result, WorldError};
    pub use crate::graph::{
        AddOutcome, Anchor, ChangePatch, Entity, EntityKind, NewEntity, NewObject, NewRegion, Offset2,
        Offset3, Region, WorldGraph, WorldObject,
    };
    pub use crate::route::{
        DirectionStep, GmDirections, GmLeg, GmRoute, GmStep, ProceedOutcome, RelayPoint, RouteSource,
        RouteTracker, TextValue, TrackerState,
    };
    pub use crate::status::{AddRemoveStatus, CamDist, CamPos, LocStatus, MoveStatus};
    pub use crate::store::{
        AddReply, CheckReply, MoveReply, MutationReply, PlaceObject, RouteProgress, UserWorld, WorldStore,
    };
    pub use crate::target::{MoveRequest, TargetResolver};
    pub use crate::view::{RegionMap, ViewInfo, ViewInfoEntry, ViewPolicy, ViewProjector, ViewRecord};
    pub use mapspace_geo::{LatLng, Pose};
}
