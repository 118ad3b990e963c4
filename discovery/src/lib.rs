//! Aggregated discovery document: wire types, the concurrency-safe store
//! that caches its encoded form, and the HTTP service that serves it.

pub mod api;
pub mod errors;
pub mod etag;
pub mod legacy;
pub mod metrics_defs;
pub mod negotiation;
pub mod store;
pub mod types;
pub mod version;

pub use api::{DEFAULT_DISCOVERY_PATH, DiscoveryService};
pub use errors::{EncodeError, StoreError};
pub use legacy::{LegacyConversionError, convert_legacy_listing};
pub use negotiation::MediaType;
pub use store::{DiscoveryStore, ReadResponse, ReadStatus, Snapshot};
pub use types::{
    DiscoveryDocument, Freshness, GroupDiscovery, LegacyResource, LegacyResourceList,
    ResourceDiscovery, Scope, VersionRecord,
};
