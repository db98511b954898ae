// src/error.rs
use thiserror::Error;

/// Errors raised while turning profiles into feature matrices.
///
/// Extraction errors abort the whole batch. Dropping a single profile would
/// shift every later row away from the labels the caller holds.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("no embedding found for any token of profile {user_id}")]
    NoEmbeddingFound { user_id: String },

    #[error("profile {user_id} is missing category attribute '{attribute}'")]
    MissingAttribute { user_id: String, attribute: String },

    /// Passed through from the embedding store without retrying.
    #[error("embedding store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("pooling failed: {0}")]
    Pooling(#[source] anyhow::Error),

    #[error("stage '{stage}' must be fitted before transform")]
    NotFitted { stage: String },

    #[error("invalid category schema: {0}")]
    InvalidSchema(String),

    /// Pipeline or predictor assembled from inconsistent parts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("labels for trait '{trait_name}' have {got} rows, expected {expected}")]
    LabelMismatch {
        trait_name: String,
        expected: usize,
        got: usize,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("extraction aborted after {completed}/{total} profiles")]
    Aborted { completed: usize, total: usize },

    #[error("extraction task failed: {0}")]
    Task(String),
}

pub type FeatureResult<T> = std::result::Result<T, FeatureError>;
