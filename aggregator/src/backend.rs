use async_trait::async_trait;
use discovery::{
    DiscoveryDocument, DiscoveryStore, LegacyConversionError, LegacyResource, LegacyResourceList,
};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum PullError {
    #[error("backend does not serve aggregated discovery")]
    NotAggregated,

    #[error("backend does not serve {group}/{version}")]
    GroupVersionNotFound { group: String, version: String },

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected response from backend: {0}")]
    UnexpectedResponse(String),

    #[error("legacy listing could not be converted: {0}")]
    Conversion(#[from] LegacyConversionError),
}

/// Handle used to pull discovery data from one backend.
///
/// Whether the backend lives in this process or behind the network is
/// invisible to the controller, except for `is_local`, which allows it to
/// pull synchronously at registration time.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// The backend's own aggregated document.
    async fn aggregated(&self) -> Result<DiscoveryDocument, PullError>;

    /// The legacy resource listing for one group version.
    async fn legacy(&self, group: &str, version: &str) -> Result<LegacyResourceList, PullError>;

    /// Whether a pull completes without network latency.
    fn is_local(&self) -> bool {
        false
    }
}

/// A backend served from a store in this process.
pub struct LocalBackend {
    store: Arc<DiscoveryStore>,
}

impl LocalBackend {
    pub fn new(store: Arc<DiscoveryStore>) -> Self {
        LocalBackend { store }
    }
}

#[async_trait]
impl DiscoveryBackend for LocalBackend {
    async fn aggregated(&self) -> Result<DiscoveryDocument, PullError> {
        Ok(self.store.document())
    }

    async fn legacy(&self, group: &str, version: &str) -> Result<LegacyResourceList, PullError> {
        Err(PullError::GroupVersionNotFound {
            group: group.to_string(),
            version: version.to_string(),
        })
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// An in-process backend that only knows the legacy listing format.
pub struct LocalLegacyBackend<F> {
    group: String,
    version: String,
    lister: F,
}

impl<F> LocalLegacyBackend<F>
where
    F: Fn() -> Vec<LegacyResource> + Send + Sync,
{
    pub fn new(group: &str, version: &str, lister: F) -> Self {
        LocalLegacyBackend {
            group: group.to_string(),
            version: version.to_string(),
            lister,
        }
    }
}

#[async_trait]
impl<F> DiscoveryBackend for LocalLegacyBackend<F>
where
    F: Fn() -> Vec<LegacyResource> + Send + Sync,
{
    async fn aggregated(&self) -> Result<DiscoveryDocument, PullError> {
        Err(PullError::NotAggregated)
    }

    async fn legacy(&self, group: &str, version: &str) -> Result<LegacyResourceList, PullError> {
        if group != self.group || version != self.version {
            return Err(PullError::GroupVersionNotFound {
                group: group.to_string(),
                version: version.to_string(),
            });
        }

        Ok(LegacyResourceList {
            group_version: format!("{group}/{version}"),
            resources: (self.lister)(),
        })
    }

    fn is_local(&self) -> bool {
        true
    }
}
