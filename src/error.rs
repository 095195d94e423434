//! Error types of the crate.
//!
//! Each type covers one concern: feature extraction, per-message processing, model readiness,
//! bus transport and configuration.

use serde_json::Value;
use thiserror::Error;

use crate::bus::RejectReason;

/// A modeled feature could not be read from an observation.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The feature is absent or null.
    #[error("missing required feature `{0}`")]
    Missing(&'static str),

    /// The feature is present but is not a finite number.
    #[error("feature `{name}` is not a finite number: {value}")]
    NotNumeric {
        /// Feature name
        name: &'static str,
        /// The offending value
        value: Value,
    },
}

/// A single inbound message could not be turned into an annotated record.
///
/// These errors never leave the processing loop: they decide how the message is rejected.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("malformed payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("cannot encode annotated record: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProcessError {
    /// The reject code reported to the bus for this error.
    pub fn reason(&self) -> RejectReason {
        match self {
            ProcessError::Decode(_) => RejectReason::MalformedPayload,
            ProcessError::Feature(_) => RejectReason::MissingRequiredFeature,
            ProcessError::Encode(_) => RejectReason::ProcessingFailure,
        }
    }
}

/// The model does not hold enough centroids to discriminate between clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("model holds {centroids} centroid(s), at least 2 are needed to predict")]
pub struct NotReady {
    pub centroids: usize,
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum BusError {
    /// The topic will not deliver any more messages.
    #[error("topic `{0}` is closed")]
    Closed(String),

    #[error("topic `{0}` already has a subscriber")]
    AlreadySubscribed(String),

    /// The bus cannot be reached at all.
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("publish to `{topic}` failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
}

/// Invalid configuration, detected before any message is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the number of clusters must be at least 1")]
    NoCluster,

    #[error("halflife must be a positive finite number, got {0}")]
    Halflife(f64),

    #[error("chunk size must be at least 1")]
    EmptyChunk,

    #[error("spawn radius must be a non-negative finite number, got {0}")]
    SpawnRadius(f64),

    #[error("cannot listen on `{0}`: {1}")]
    Listen(String, &'static str),
}
