use crate::core::ports::broker::{BrokerMessage, BrokerPort};
use crate::utils::error::{NotifierError, NotifierResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// An in-memory broker adapter.
///
/// This adapter implements the `BrokerPort` trait with an unbounded channel
/// and a local subscription set, emulating pub/sub semantics within one
/// process: a published message is observable through `receive` only if its
/// channel is currently subscribed.
///
/// # Note
///
/// This implementation is intended for tests and single-process deployments
/// where cross-process fan-out is not needed. `set_available(false)` simulates
/// a broker outage: every operation then fails with `BrokerUnavailable` until
/// availability is restored.
pub struct MemoryBrokerAdapter {
    subscriptions: Mutex<HashSet<String>>,
    sender: mpsc::UnboundedSender<BrokerMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<BrokerMessage>>,
    available: AtomicBool,
}

impl MemoryBrokerAdapter {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            subscriptions: Mutex::new(HashSet::new()),
            sender,
            receiver: Mutex::new(receiver),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the broker connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> NotifierResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NotifierError::BrokerUnavailable(
                "in-memory broker marked unavailable".into(),
            ))
        }
    }

    /// Returns the currently subscribed channels, for assertions in tests.
    pub async fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions.lock().await.iter().cloned().collect()
    }
}

impl Default for MemoryBrokerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerPort for MemoryBrokerAdapter {
    async fn connect(&self) -> NotifierResult<()> {
        self.check_available()
    }

    async fn publish(&self, channel: &str, message: &str) -> NotifierResult<()> {
        self.check_available()?;

        if self.subscriptions.lock().await.contains(channel) {
            // A dropped receiver only means nobody is listening.
            let _ = self.sender.send(BrokerMessage {
                channel: channel.to_string(),
                payload: message.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> NotifierResult<()> {
        self.check_available()?;
        self.subscriptions.lock().await.insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> NotifierResult<()> {
        self.check_available()?;
        self.subscriptions.lock().await.remove(channel);
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> NotifierResult<Option<BrokerMessage>> {
        self.check_available()?;

        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(NotifierError::BrokerUnavailable(
                "in-memory broker channel closed".into(),
            )),
        }
    }

    async fn close(&self) -> NotifierResult<()> {
        self.subscriptions.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_only_subscribed_channels() {
        let broker = MemoryBrokerAdapter::new();
        broker.subscribe("tenant:T1:events").await.unwrap();

        broker.publish("tenant:T1:events", "one").await.unwrap();
        broker.publish("tenant:T2:events", "two").await.unwrap();

        let received = broker
            .receive(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.channel, "tenant:T1:events");
        assert_eq!(received.payload, "one");

        // The unsubscribed tenant's message was never queued.
        let empty = broker.receive(Duration::from_millis(50)).await.unwrap();
        assert!(empty.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_every_operation() {
        let broker = MemoryBrokerAdapter::new();
        broker.set_available(false);

        assert!(broker.connect().await.is_err());
        assert!(broker.publish("c", "m").await.is_err());
        assert!(broker.subscribe("c").await.is_err());
        assert!(broker
            .receive(Duration::from_millis(10))
            .await
            .unwrap_err()
            .is_broker_unavailable());

        broker.set_available(true);
        assert!(broker.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let broker = MemoryBrokerAdapter::new();
        broker.subscribe("tenant:T1:events").await.unwrap();
        broker.unsubscribe("tenant:T1:events").await.unwrap();

        broker.publish("tenant:T1:events", "late").await.unwrap();
        let received = broker.receive(Duration::from_millis(50)).await.unwrap();
        assert!(received.is_none());
    }
}
