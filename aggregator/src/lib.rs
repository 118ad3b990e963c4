//! Pulls discovery data from backend sources and merges it into a
//! [`discovery::DiscoveryStore`].

pub mod backend;
pub mod controller;
pub mod http_backend;
pub mod metrics_defs;

pub use backend::{DiscoveryBackend, LocalBackend, LocalLegacyBackend, PullError};
pub use controller::{AggregationController, SourceState};
pub use http_backend::HttpBackend;
