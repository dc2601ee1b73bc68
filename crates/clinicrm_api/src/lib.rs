//! Request/response boundary over `clinicrm_core`.
//!
//! Callers (HTTP handlers, UI bridges, scripts) go through `CrmApi`, either
//! with typed request structs or with `dispatch_json`.

pub mod api;
pub mod dto;

pub use api::{status_code, CrmApi};
pub use dto::ApiResponse;

/// Minimal health-check API for boundary smoke checks.
pub fn ping() -> String {
    clinicrm_core::ping().to_owned()
}

/// Core crate version as seen through the boundary.
pub fn core_version() -> String {
    clinicrm_core::core_version().to_owned()
}
