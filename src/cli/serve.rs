use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tracing::info;

use crate::core::config::DaemonConfig;
use crate::core::provider::realtime::RealtimeConnector;
use crate::core::provider::stateless::StatelessClient;
use crate::core::push::PushHub;
use crate::core::runtime::RuntimeRegistry;
use crate::core::runtime::health::HealthPoller;
use crate::core::store::SessionStore;
use crate::core::templates::TemplateRegistry;
use crate::interfaces::web::ApiServer;
use crate::logging;

const PUSH_BUFFER: usize = 500;
const LOG_BUFFER: usize = 500;

/// Foreground daemon: store, runtime registry, health poller, API surface.
pub async fn run_serve(config_path: &Path, api_port_override: Option<u16>) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(LOG_BUFFER);
    logging::init(log_tx.clone(), false);

    let mut config = DaemonConfig::load(config_path)?;
    if let Some(port) = api_port_override {
        config.api_port = port;
    }

    let store = Arc::new(SessionStore::new(&config.data_dir).await?);
    let push = PushHub::new(PUSH_BUFFER);
    let templates = Arc::new(TemplateRegistry::with_builtin());
    let connector = Arc::new(RealtimeConnector::new(
        config.provider.realtime_url.clone(),
        config.provider.api_key.clone(),
    ));
    let stateless = Arc::new(StatelessClient::new(
        config.provider.stateless_url.clone(),
        config.provider.api_key.clone(),
    ));

    let registry = Arc::new(RuntimeRegistry::new(
        store,
        push.clone(),
        templates,
        connector,
        stateless,
        config.provider.clone(),
    ));

    let scheduler = JobScheduler::new().await?;
    let poller = HealthPoller::new(registry.clone(), push.clone());
    poller.attach(&scheduler, config.poll_interval_secs).await?;
    scheduler.start().await?;

    // First reconciliation shortly after boot, ahead of the cron cadence, so
    // a restart picks its sessions back up without waiting a full interval.
    {
        let poller = poller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            poller.tick().await;
        });
    }

    info!("stagehand daemon starting");
    let api = ApiServer::new(
        registry,
        push,
        log_tx,
        config.api_host.clone(),
        config.api_port,
        config.internal_token.clone(),
    );
    api.serve().await
}
