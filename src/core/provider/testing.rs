use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::protocol::{ChannelEvent, ClientMessage, SessionConfig};
use super::realtime::{ChannelState, Connector, DuplexConn};

/// One scripted frame for a mock connection.
#[derive(Debug, Clone)]
pub enum MockFrame {
    Event(ChannelEvent),
    /// The channel closes underneath the adapter at this point.
    Close,
}

/// Scripted stand-in for the realtime connector. Each successive `open` pops
/// the next script; an exhausted script list yields connections that stay
/// open and silent.
pub struct MockConnector {
    scripts: Mutex<VecDeque<Vec<MockFrame>>>,
    pub opens: AtomicUsize,
    pub live_conns: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<ClientMessage>>>,
    pub fail_next_open: AtomicBool,
    pub fail_sends: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
            live_conns: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_next_open: AtomicBool::new(false),
            fail_sends: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn push_script(&self, frames: Vec<MockFrame>) {
        self.scripts.lock().await.push_back(frames);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.live_conns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _config: &SessionConfig) -> Result<Box<dyn DuplexConn>> {
        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("scripted connect failure"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let frames = self
            .scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_default();
        self.live_conns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConn {
            frames: VecDeque::from(frames),
            state: ChannelState::Open,
            provider_session_id: format!("mock-{}", self.open_count()),
            live_conns: self.live_conns.clone(),
            counted: true,
            sent: self.sent.clone(),
            fail_sends: self.fail_sends.clone(),
        }))
    }
}

pub struct MockConn {
    frames: VecDeque<MockFrame>,
    state: ChannelState,
    provider_session_id: String,
    live_conns: Arc<AtomicUsize>,
    counted: bool,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockConn {
    fn release(&mut self) {
        if self.counted {
            self.live_conns.fetch_sub(1, Ordering::SeqCst);
            self.counted = false;
        }
    }
}

impl Drop for MockConn {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl DuplexConn for MockConn {
    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("scripted send failure"));
        }
        self.sent.lock().await.push(msg.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        match self.frames.pop_front() {
            Some(MockFrame::Event(event)) => Some(event),
            Some(MockFrame::Close) => {
                self.state = ChannelState::Closed;
                self.release();
                None
            }
            None => {
                // Script exhausted: stay open and silent until cancelled.
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn close(&mut self) {
        self.state = ChannelState::Closed;
        self.release();
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn provider_session_id(&self) -> &str {
        &self.provider_session_id
    }
}
