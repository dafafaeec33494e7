use std::io;

use crate::metrics::MetricKind;

/// Everything that can go wrong inside pullmetrics. Mutation paths on
/// [`crate::Metrics`] never return these to the caller, they are logged at the
/// facade boundary instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),

    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),

    #[error("bucket boundaries must be finite and strictly ascending")]
    InvalidBuckets,

    #[error("{kind} family not found: {name}")]
    FamilyNotFound { kind: MetricKind, name: String },

    #[error("exposer path must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("failed to bind exposer to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("exposer runtime: {0}")]
    Runtime(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
