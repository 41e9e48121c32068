use crate::core::domain::envelope::Envelope;
use crate::core::ports::broker::BrokerPort;
use crate::messaging::registry::ConnectionRegistry;
use crate::messaging::tenant_from_channel;
use crate::utils::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the fan-out loop, draining broker messages into local delivery.
///
/// Exactly one instance of this loop runs per process regardless of how many
/// tenants are subscribed; it is the single point of multiplexing between the
/// broker and the connection registry. Each poll is bounded by
/// `poll_timeout`, so cancellation is observed promptly.
///
/// # Error Handling
/// - Messages on a malformed channel or with an unparseable envelope are
///   logged and dropped; the loop continues.
/// - `BrokerUnavailable` triggers a backoff per `retry` followed by a redial;
///   no client connection is closed because of it.
/// - Nothing here is allowed to take the process down.
///
/// On cancellation the loop unsubscribes every channel through
/// `registry.close()` and closes the broker connection before returning.
pub async fn run_fanout_listener(
    broker: Arc<dyn BrokerPort>,
    registry: Arc<ConnectionRegistry>,
    cancel_token: CancellationToken,
    poll_timeout: Duration,
    retry: RetryPolicy,
) {
    info!("fan-out listener started");

    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;
    let mut reconnect_attempt: u32 = 0;

    loop {
        select! {
            _ = cancel_token.cancelled() => {
                info!("fan-out listener cancelled gracefully");
                break;
            }
            result = broker.receive(poll_timeout) => {
                match result {
                    Ok(Some(message)) => {
                        reconnect_attempt = 0;

                        let Some(tenant_id) = tenant_from_channel(&message.channel) else {
                            warn!(channel = message.channel.as_str(), "message on unexpected channel");
                            dropped += 1;
                            continue;
                        };

                        match serde_json::from_str::<Envelope>(&message.payload) {
                            Ok(envelope) => {
                                let count = registry.deliver(tenant_id, &envelope).await;
                                delivered += count as u64;
                                if count == 0 {
                                    dropped += 1;
                                }
                            }
                            Err(e) => {
                                warn!(tenant_id, "discarding unparseable envelope: {e}");
                                dropped += 1;
                            }
                        }
                    }
                    Ok(None) => {
                        // Poll timeout; loop to re-check the shutdown flag.
                        reconnect_attempt = 0;
                    }
                    Err(e) => {
                        let delay = retry.delay(reconnect_attempt);
                        reconnect_attempt = reconnect_attempt.saturating_add(1);
                        warn!(
                            attempt = reconnect_attempt,
                            "broker receive failed, retrying in {delay:?}: {e}"
                        );

                        select! {
                            _ = cancel_token.cancelled() => {
                                info!("fan-out listener cancelled during backoff");
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }

                        if let Err(e) = broker.connect().await {
                            warn!("broker reconnect failed: {e}");
                        }
                    }
                }
            }
        }
    }

    if let Err(e) = registry.close().await {
        warn!("registry close failed: {e}");
    }
    if let Err(e) = broker.close().await {
        warn!("broker close failed: {e}");
    }

    info!(delivered, dropped, "fan-out listener shutting down");
}
