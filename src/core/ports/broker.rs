use crate::utils::error::NotifierResult;
use async_trait::async_trait;
use std::time::Duration;

/// A raw message as received from a broker channel.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// The channel the message arrived on (e.g. `tenant:T1:events`).
    pub channel: String,
    /// The serialized envelope.
    pub payload: String,
}

/// A trait abstracting the pub/sub message bus.
///
/// The `BrokerPort` trait is the seam between the distribution pipeline and
/// the concrete bus. The production adapter speaks Redis pub/sub; an
/// in-memory adapter backs tests and single-process deployments.
///
/// Connection loss surfaces as `NotifierError::BrokerUnavailable` from any
/// operation; callers decide policy (the publisher swallows it, the registry
/// logs and carries on, the fan-out listener backs off and redials).
/// `subscribe` and `unsubscribe` must tolerate duplicate calls for the same
/// channel.
///
/// The trait is annotated with `#[cfg_attr(feature = "test-helpers", mockall::automock)]`
/// to allow automatic generation of mock implementations for testing purposes.
#[async_trait]
#[cfg_attr(feature = "test-helpers", mockall::automock)]
pub trait BrokerPort: Send + Sync {
    /// Establishes (or re-establishes) the broker connection.
    ///
    /// A single call makes at most one dial attempt; pacing repeated attempts
    /// is the caller's job via a `RetryPolicy`.
    async fn connect(&self) -> NotifierResult<()>;

    /// Publishes a serialized message to the given channel.
    async fn publish(&self, channel: &str, message: &str) -> NotifierResult<()>;

    /// Subscribes this process to a channel.
    ///
    /// The subscription intent must survive a broker outage: after a
    /// reconnect the adapter re-subscribes every channel that was requested
    /// and not yet unsubscribed.
    async fn subscribe(&self, channel: &str) -> NotifierResult<()>;

    /// Removes this process's subscription to a channel.
    async fn unsubscribe(&self, channel: &str) -> NotifierResult<()>;

    /// Waits up to `timeout` for the next message on any subscribed channel.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a message, so the
    /// fan-out listener can cooperatively check its shutdown flag between
    /// polls. Must never block meaningfully beyond `timeout`.
    async fn receive(&self, timeout: Duration) -> NotifierResult<Option<BrokerMessage>>;

    /// Drops all subscriptions and closes the connection.
    async fn close(&self) -> NotifierResult<()>;
}
