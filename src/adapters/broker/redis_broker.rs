use crate::core::ports::broker::{BrokerMessage, BrokerPort};
use crate::utils::error::{NotifierError, NotifierResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long one `receive` iteration may hold the pub/sub connection lock.
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

/// Clamps the next wait slice to the remaining window, `None` once the
/// deadline has passed.
fn next_slice(deadline: Instant, max: Duration) -> Option<Duration> {
    let remaining = deadline.checked_duration_since(Instant::now())?;
    if remaining.is_zero() {
        None
    } else {
        Some(remaining.min(max))
    }
}

/// A broker adapter speaking Redis pub/sub.
///
/// Redis needs two connections for this workload: publishing happens on a
/// multiplexed command connection, while subscriptions put a connection into
/// pub/sub mode where only (un)subscribe and message frames are valid. Both
/// are established lazily and dropped on the first error, so the next call
/// re-dials.
///
/// The set of subscribed channels is tracked locally as the source of truth.
/// When the pub/sub connection is re-established after an outage, every
/// channel in the set is re-subscribed, so a subscription requested during an
/// outage is repaired without the registry having to care.
pub struct RedisBrokerAdapter {
    client: Client,
    publish_conn: Mutex<Option<MultiplexedConnection>>,
    pubsub_conn: Mutex<Option<redis::aio::PubSub>>,
    /// Channels this process wants to be subscribed to.
    channels: Mutex<HashSet<String>>,
}

impl RedisBrokerAdapter {
    /// Creates an adapter for the given Redis URL.
    ///
    /// No connection is dialed here; the URL is only parsed. An invalid URL
    /// is a configuration error.
    pub fn new(url: &str) -> NotifierResult<Self> {
        let client = Client::open(url).map_err(|e| NotifierError::Config(e.to_string()))?;
        Ok(Self {
            client,
            publish_conn: Mutex::new(None),
            pubsub_conn: Mutex::new(None),
            channels: Mutex::new(HashSet::new()),
        })
    }

    /// Ensures the pub/sub connection exists, replaying the subscribed
    /// channel set onto a freshly dialed connection.
    async fn ensure_pubsub(&self) -> NotifierResult<()> {
        let mut guard = self.pubsub_conn.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut pubsub = self.client.get_async_pubsub().await.map_err(broker_err)?;

        let channels: Vec<String> = self.channels.lock().await.iter().cloned().collect();
        for channel in &channels {
            pubsub.subscribe(channel).await.map_err(broker_err)?;
        }
        if !channels.is_empty() {
            debug!(count = channels.len(), "re-subscribed broker channels");
        }

        *guard = Some(pubsub);
        Ok(())
    }
}

#[async_trait]
impl BrokerPort for RedisBrokerAdapter {
    async fn connect(&self) -> NotifierResult<()> {
        {
            let mut guard = self.publish_conn.lock().await;
            if guard.is_none() {
                let conn = self
                    .client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(broker_err)?;
                *guard = Some(conn);
            }
        }
        self.ensure_pubsub().await
    }

    async fn publish(&self, channel: &str, message: &str) -> NotifierResult<()> {
        let mut guard = self.publish_conn.lock().await;
        if guard.is_none() {
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(broker_err)?;
            *guard = Some(conn);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(NotifierError::BrokerUnavailable(
                "publish connection not established".into(),
            ));
        };

        match conn.publish::<_, _, ()>(channel, message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The connection is suspect after a failed command.
                *guard = None;
                Err(broker_err(e))
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> NotifierResult<()> {
        self.channels.lock().await.insert(channel.to_string());

        let mut guard = self.pubsub_conn.lock().await;
        if let Some(pubsub) = guard.as_mut() {
            if let Err(e) = pubsub.subscribe(channel).await {
                *guard = None;
                return Err(broker_err(e));
            }
            return Ok(());
        }
        drop(guard);

        self.ensure_pubsub().await
    }

    async fn unsubscribe(&self, channel: &str) -> NotifierResult<()> {
        self.channels.lock().await.remove(channel);

        let mut guard = self.pubsub_conn.lock().await;
        if let Some(pubsub) = guard.as_mut() {
            if let Err(e) = pubsub.unsubscribe(channel).await {
                *guard = None;
                return Err(broker_err(e));
            }
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> NotifierResult<Option<BrokerMessage>> {
        let deadline = Instant::now() + timeout;

        // Bound the dial as well, so a dead broker cannot stall the listener
        // past its poll interval.
        match tokio::time::timeout(timeout, self.ensure_pubsub()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(NotifierError::BrokerUnavailable(
                    "timed out establishing pub/sub connection".into(),
                ))
            }
        }

        // Wait in short slices, releasing the connection lock between them,
        // so a concurrent subscribe or unsubscribe is never stalled behind a
        // full idle poll. Messages arriving between slices stay buffered on
        // the connection.
        loop {
            let Some(slice) = next_slice(deadline, RECEIVE_SLICE) else {
                // Poll timeout; the caller loops and checks its shutdown flag.
                return Ok(None);
            };

            let mut guard = self.pubsub_conn.lock().await;
            let Some(pubsub) = guard.as_mut() else {
                return Err(NotifierError::BrokerUnavailable(
                    "pub/sub connection not established".into(),
                ));
            };

            let next = {
                let mut stream = pubsub.on_message();
                tokio::time::timeout(slice, stream.next()).await
            };

            match next {
                Err(_) => continue,
                Ok(None) => {
                    *guard = None;
                    return Err(NotifierError::BrokerUnavailable(
                        "pub/sub stream closed".into(),
                    ));
                }
                Ok(Some(msg)) => {
                    let channel = msg.get_channel_name().to_string();
                    let payload: String = msg.get_payload().map_err(broker_err)?;
                    return Ok(Some(BrokerMessage { channel, payload }));
                }
            }
        }
    }

    async fn close(&self) -> NotifierResult<()> {
        let channels: Vec<String> = self.channels.lock().await.drain().collect();

        let mut guard = self.pubsub_conn.lock().await;
        if let Some(pubsub) = guard.as_mut() {
            for channel in &channels {
                if let Err(e) = pubsub.unsubscribe(channel).await {
                    warn!(channel = channel.as_str(), "unsubscribe on close failed: {e}");
                    break;
                }
            }
        }
        *guard = None;
        *self.publish_conn.lock().await = None;
        Ok(())
    }
}

fn broker_err(e: redis::RedisError) -> NotifierError {
    NotifierError::BrokerUnavailable(e.to_string())
}
