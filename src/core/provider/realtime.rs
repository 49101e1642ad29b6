use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::protocol::{ChannelEvent, ClientMessage, SessionConfig, decode_event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// One live duplex connection. The read pump owns the value exclusively, so
/// methods take `&mut self`.
#[async_trait]
pub trait DuplexConn: Send {
    async fn send(&mut self, msg: &ClientMessage) -> Result<()>;
    /// Next decoded inbound event; `None` once the channel is closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
    async fn close(&mut self);
    fn state(&self) -> ChannelState;
    fn provider_session_id(&self) -> &str;
}

/// The seam between session adapters and the wire. Tests inject scripted
/// connectors; production uses [`RealtimeConnector`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn DuplexConn>>;
}

pub struct RealtimeConnector {
    base_url: String,
    api_key: String,
}

impl RealtimeConnector {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self { base_url, api_key }
    }
}

#[async_trait]
impl Connector for RealtimeConnector {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn DuplexConn>> {
        let url = format!("{}?model={}", self.base_url, config.model);
        let mut request = url
            .as_str()
            .into_client_request()
            .context("invalid realtime endpoint url")?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.api_key)
                .parse()
                .context("api key is not a valid header value")?,
        );

        let (stream, _response) = connect_async(request)
            .await
            .context("realtime channel handshake failed")?;

        let mut conn = WsConn {
            stream,
            state: ChannelState::Open,
            provider_session_id: uuid::Uuid::new_v4().to_string(),
        };

        // Session configuration is sent exactly once per connection, before
        // any other traffic.
        conn.send(&ClientMessage::SessionConfig(config.clone()))
            .await?;

        Ok(Box::new(conn))
    }
}

pub struct WsConn {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: ChannelState,
    provider_session_id: String,
}

#[async_trait]
impl DuplexConn for WsConn {
    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(msg)?;
        if let Err(e) = self.stream.send(Message::Text(payload.into())).await {
            self.state = ChannelState::Closed;
            return Err(anyhow::anyhow!("channel send failed: {}", e));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(raw))) => {
                    if let Some(event) = decode_event(raw.as_str()) {
                        return Some(event);
                    }
                    // Malformed frame dropped; keep reading.
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    debug!("Channel keepalive frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.state = ChannelState::Closed;
                    return None;
                }
                Some(Ok(_)) => {
                    debug!("Skipping non-text channel frame");
                }
                Some(Err(e)) => {
                    warn!("Channel read error: {}", e);
                    self.state = ChannelState::Closed;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
        self.state = ChannelState::Closed;
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn provider_session_id(&self) -> &str {
        &self.provider_session_id
    }
}

/// Connect-time auth/config failures are terminal for the session; everything
/// else is transient and left to the health poller's normal cadence.
pub fn is_terminal_connect_error(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(tokio_tungstenite::tungstenite::Error::Http(response)) =
            cause.downcast_ref::<tokio_tungstenite::tungstenite::Error>()
        {
            let code = response.status().as_u16();
            if code == 401 || code == 403 {
                return true;
            }
        }
    }
    false
}
