use crate::negotiation::NegotiationError;
use thiserror::Error;

/// Encoding failed. Cached alongside the snapshot it belongs to, hence
/// `Clone` and string payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("json encoding failed: {0}")]
    Json(String),

    #[error("yaml encoding failed: {0}")]
    Yaml(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("internal error: {0}")]
    Encode(#[from] EncodeError),
}
