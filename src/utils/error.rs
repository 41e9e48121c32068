use actix_web::ResponseError;
use thiserror::Error;

/// Represents errors that can occur in the notification service.
///
/// The `NotifierError` enum covers the failure classes of the event
/// distribution pipeline: handshake authentication, loss of the broker
/// connection, configuration issues, and task join errors. Wire protocol
/// violations and per-socket send failures are handled in place (close codes
/// on the socket, eviction from the registry) and never cross an API
/// boundary as errors.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type NotifierResult<T> = Result<T, NotifierError>;

impl NotifierError {
    /// Returns `true` when the error indicates a lost broker connection.
    ///
    /// Callers pick their own policy on this class: the publisher retries once
    /// after a reconnect, the fan-out listener backs off and redials, and
    /// neither closes any open client connection because of it.
    pub fn is_broker_unavailable(&self) -> bool {
        matches!(self, NotifierError::BrokerUnavailable(_))
    }
}

impl ResponseError for NotifierError {}
