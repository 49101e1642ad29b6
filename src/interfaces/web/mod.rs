mod auth;
mod router;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::core::push::PushHub;
use crate::core::runtime::RuntimeRegistry;

/// Thin HTTP surface over the core: trigger entry points, status reads and
/// the push stream. Ownership checks and event CRUD live elsewhere; this
/// server only flips orchestration state and reports it.
pub struct ApiServer {
    registry: Arc<RuntimeRegistry>,
    push: PushHub,
    log_tx: tokio::sync::broadcast::Sender<String>,
    api_host: String,
    api_port: u16,
    internal_token: String,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<RuntimeRegistry>,
    pub(crate) push: PushHub,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) internal_token: String,
}

impl ApiServer {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        push: PushHub,
        log_tx: tokio::sync::broadcast::Sender<String>,
        api_host: String,
        api_port: u16,
        internal_token: String,
    ) -> Self {
        Self {
            registry,
            push,
            log_tx,
            api_host,
            api_port,
            internal_token,
        }
    }

    pub async fn serve(self) -> Result<()> {
        let state = AppState {
            registry: self.registry,
            push: self.push,
            log_tx: self.log_tx,
            api_host: self.api_host.clone(),
            api_port: self.api_port,
            internal_token: self.internal_token,
        };
        let app = router::build_api_router(state);

        let addr = format!("{}:{}", self.api_host, self.api_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
