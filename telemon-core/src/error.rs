//! Error taxonomy of the telemetry core.
//!
//! Transport failures stay inside the broker adapter (they drive the
//! reconnect state machine); everything else is returned to the caller.

use std::time::Duration;
use time::OffsetDateTime;

use crate::broker::ConnectionState;

/// Handshake or transport failure. Never fatal: the link moves to
/// `Reconnecting` and retries after backoff.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("broker refused connection (return code {0})")]
    Refused(u8),
    #[error("no CONNACK within {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<rumqttc::ConnectionError> for ConnectionError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        match err {
            rumqttc::ConnectionError::ConnectionRefused(code) => ConnectionError::Refused(code as u8),
            other => ConnectionError::Transport(other.to_string()),
        }
    }
}

/// Outbound command could not be handed to the broker client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("not connected to broker (state: {0})")]
    NotConnected(ConnectionState),
    #[error("publish rejected by client: {0}")]
    Rejected(String),
}

/// Inbound payload that is not valid UTF-8 text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("payload on {topic} is not valid UTF-8 ({len} bytes)")]
pub struct MalformedPayload {
    pub topic: String,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UsageError {
    #[error("range start {start} is after range end {end}")]
    InvertedRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error("historical dataset is empty")]
    EmptyHistory,
    #[error("day offset {0} is outside the representable calendar")]
    DayOutOfRange(i64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopicError {
    #[error("invalid topic segment {0:?}")]
    InvalidSegment(String),
    #[error("no tracked channel configured for the rolling window")]
    MissingTracked,
}

/// Errors surfaced by the query/command facade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FacadeError {
    #[error("topic {0} has no command topic")]
    NotSwitchable(String),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}
