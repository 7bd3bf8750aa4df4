//! # MapSpace Server
//!
//! HTTP surface over the per-user world engine plus a passthrough to the
//! upstream map provider.
//!
//! ## Endpoints
//!
//! - `GET /view-prompt`, `/view-point`, `/view-info`, `/region-map` - views
//! - `POST /check-target`, `/move-to-target` - targets and movement
//! - `POST /add-object`, `/remove-object`, `/change-object` - world edits
//! - `POST /route`, `GET /route`, `POST /route/reset` - route tracking
//! - `/maps/*` - directions, time zone, place search, street view
//! - `GET /health`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mapspace_server::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let server = MapSpaceServer::new(ServerConfig::from_env()?)?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod provider;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServiceError, ServiceResult};
pub use provider::{HttpMapProvider, MapProvider, ProviderError};
pub use server::{build_router, AppState, MapSpaceServer};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient re-exports for running the server.
pub mod prelude {
    pub use super::config::{CorsConfig, ProviderConfig, ServerConfig};
    pub use super::error::{ServiceError, ServiceResult};
    pub use super::provider::{HttpMapProvider, MapProvider, ProviderError};
    pub use super::server::{build_router, AppState, MapSpaceServer};
}
