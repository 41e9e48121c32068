mod setup;

use crate::adapters::api::server::{launch_api_server, WsState};
use crate::adapters::auth::jwt_verifier::JwtVerifierAdapter;
use crate::adapters::auth::memory_directory::MemoryUserDirectory;
use crate::adapters::broker::redis_broker::RedisBrokerAdapter;
use crate::config::Config;
use crate::core::ports::auth::TokenVerifierPort;
use crate::core::ports::broker::BrokerPort;
use crate::messaging::registry::ConnectionRegistry;
use crate::utils::error::NotifierResult;
use crate::utils::logger;
use crate::utils::retry::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct BootstrapArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run_bootstrap() -> NotifierResult<()> {
    logger::init();

    let cancel_token = CancellationToken::new();
    let args = BootstrapArgs::parse();

    let config = match Config::new(args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config error: {}", e);
            std::process::exit(1);
        }
    };
    config.validate()?;

    let broker: Arc<dyn BrokerPort> = Arc::new(RedisBrokerAdapter::new(&config.broker.url)?);
    // A dead broker at startup is not fatal; the fan-out loop keeps redialing.
    if let Err(e) = broker.connect().await {
        warn!("broker not reachable at startup: {e}");
    }

    let registry = Arc::new(ConnectionRegistry::new(broker.clone()));

    // The user directory port is where the CRM's user store plugs in; the
    // in-memory adapter serves local runs.
    let directory = Arc::new(MemoryUserDirectory::new());
    let verifier: Arc<dyn TokenVerifierPort> = Arc::new(JwtVerifierAdapter::new(
        config.auth.jwt_secret.as_bytes(),
        directory,
    ));

    let retry = RetryPolicy::new(config.retry.base_delay, config.retry.max_delay);
    let mut process_handles = vec![];
    process_handles.push(setup::spawn_fanout_listener(
        broker.clone(),
        registry.clone(),
        cancel_token.clone(),
        config.broker.poll_timeout,
        retry,
    ));

    let ws_state = Arc::new(WsState {
        verifier,
        registry,
        cookie_name: config.auth.cookie_name.clone(),
        handshake_timeout: config.auth.handshake_timeout,
    });

    launch_api_server(config.server.host, config.server.port, ws_state).await?;

    shut_down(cancel_token, process_handles).await
}

pub async fn shut_down(
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
) -> NotifierResult<()> {
    cancel_token.cancel();

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
