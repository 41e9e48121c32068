use crate::core::ports::broker::BrokerPort;
use crate::messaging::fanout::run_fanout_listener;
use crate::messaging::registry::ConnectionRegistry;
use crate::utils::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn spawn_fanout_listener(
    broker: Arc<dyn BrokerPort>,
    registry: Arc<ConnectionRegistry>,
    cancel_token: CancellationToken,
    poll_timeout: Duration,
    retry: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_fanout_listener(broker, registry, cancel_token, poll_timeout, retry).await;
    })
}
