use tenant_notifier::bootstrap::run_bootstrap;
use tenant_notifier::utils::error::NotifierResult;

#[tokio::main]
async fn main() -> NotifierResult<()> {
    run_bootstrap().await
}
