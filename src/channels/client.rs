//! Notification channel: one WebSocket kept alive by an explicit reconnect loop
//!
//! ```text
//! idle ──start──▶ connecting ──ok──▶ open ──server close / error──┐
//!                     │   ▲                                       │
//!                     │   └──────────── delay elapsed ── backoff ◀┘
//!                     └──────── connect error ─────────────▲
//! any state ──stop──▶ closed
//! ```
//!
//! The loop never gives up unless the [`ReconnectPolicy`] has a cap. Events
//! the server pushes while the socket is down are lost.

use super::dedup::DedupFilter;
use super::policy::ReconnectPolicy;
use super::transport::{Connector, Frame, Transport, WsConnector};
use super::{parse_message, Endpoint, NotificationEvent};
use crate::config::{join_url, ClientConfig};
use crate::error::{ClientError, Result};

use parking_lot::ReentrantMutex;
use reqwest::Url;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection state of a notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, background task not yet running
    Idle,
    /// Connection attempt in flight
    Connecting,
    /// Socket open, receiving events
    Open,
    /// Waiting out the reconnect delay
    Backoff,
    /// Stopped, or the reconnect policy gave up
    Closed,
}

/// Handler for recognized events
pub type EventHandler = Arc<dyn Fn(NotificationEvent) + Send + Sync>;

/// Handler for connection failures. Failures never stop the retry loop.
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// State shared between the handle and the background task
struct Shared {
    // Held for the duration of every callback. `stop()` takes it too, so once
    // `stop()` returns no callback is running and none will start.
    // Reentrant so a callback may stop its own channel.
    stopped: ReentrantMutex<Cell<bool>>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU64,
    on_event: Option<EventHandler>,
    on_error: Option<ErrorHandler>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let stopped = self.stopped.lock();
        if stopped.get() && state != ConnectionState::Closed {
            return;
        }
        self.state.send_replace(state);
    }

    /// Record a connection attempt; `false` once stopped
    fn begin_attempt(&self) -> bool {
        let stopped = self.stopped.lock();
        if stopped.get() {
            return false;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connecting);
        true
    }

    fn emit_event(&self, event: NotificationEvent) {
        let stopped = self.stopped.lock();
        if stopped.get() {
            return;
        }
        if let Some(handler) = &self.on_event {
            handler(event);
        }
    }

    fn emit_error(&self, error: &ClientError) {
        let stopped = self.stopped.lock();
        if stopped.get() {
            return;
        }
        if let Some(handler) = &self.on_error {
            handler(error);
        }
    }

    /// Returns `true` on the first call
    fn stop(&self) -> bool {
        let stopped = self.stopped.lock();
        let first = !stopped.replace(true);
        self.state.send_replace(ConnectionState::Closed);
        first
    }

    fn is_stopped(&self) -> bool {
        self.stopped.lock().get()
    }
}

/// Configured, not yet started notification channel
pub struct NotificationChannel {
    endpoint: Endpoint,
    url: Url,
    policy: ReconnectPolicy,
    dedup_window: Option<Duration>,
    connector: Arc<dyn Connector>,
    on_event: Option<EventHandler>,
    on_error: Option<ErrorHandler>,
}

impl NotificationChannel {
    /// Channel for `endpoint` using the config's WebSocket base, reconnect
    /// policy and dedup window
    pub fn new(config: &ClientConfig, endpoint: Endpoint) -> Result<Self> {
        let url = join_url(&config.ws_base()?, endpoint.path())?;

        Ok(Self {
            endpoint,
            url,
            policy: config.reconnect_policy,
            dedup_window: config.dedup_window,
            connector: Arc::new(WsConnector::new()),
            on_event: None,
            on_error: None,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Replace the WebSocket connector
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dedup_window(mut self, window: Option<Duration>) -> Self {
        self.dedup_window = window;
        self
    }

    /// Called for each recognized event, in arrival order
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(NotificationEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(handler));
        self
    }

    /// Called for each failed connection attempt or lost connection
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Spawn the connection loop on the current tokio runtime
    pub fn start(self) -> ChannelHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            stopped: ReentrantMutex::new(Cell::new(false)),
            state: state_tx,
            attempts: AtomicU64::new(0),
            on_event: self.on_event,
            on_error: self.on_error,
        });

        let runner = Runner {
            endpoint: self.endpoint,
            url: self.url,
            policy: self.policy,
            connector: self.connector,
            dedup: self.dedup_window.map(DedupFilter::new),
            shared: shared.clone(),
            shutdown: shutdown_rx,
        };

        let task = tokio::spawn(runner.run());

        ChannelHandle {
            shared,
            shutdown: shutdown_tx,
            state_rx,
            task: Some(task),
        }
    }
}

/// Running notification channel
///
/// Dropping the handle stops the channel.
pub struct ChannelHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Connection attempts made so far, including the first
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Stop the channel.
    ///
    /// When this returns no callback is running, none will fire again, and
    /// no further connection attempt will be made. The open socket (if any)
    /// is closed by the background task right after.
    pub fn stop(&self) {
        if self.shared.stop() {
            info!("Notification channel stopped");
        }
        self.shutdown.send_replace(true);
    }

    /// Stop and wait for the background task to close the socket
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How an open connection ended
enum SessionEnd {
    Stopped,
    Closed { code: Option<u16>, reason: String },
    Failed(ClientError),
}

/// Background task state
struct Runner {
    endpoint: Endpoint,
    url: Url,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    dedup: Option<DedupFilter>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
}

impl Runner {
    async fn run(mut self) {
        // consecutive failed connection attempts
        let mut failures: u32 = 0;

        loop {
            if !self.shared.begin_attempt() {
                break;
            }

            debug!(url = %self.url, "Connecting");
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(mut transport) => {
                    failures = 0;
                    self.shared.set_state(ConnectionState::Open);
                    info!(endpoint = %self.endpoint, "Notification channel open");

                    match self.pump(transport.as_mut()).await {
                        SessionEnd::Stopped => {
                            if let Err(e) = transport.close().await {
                                debug!(error = %e, "Error closing socket");
                            }
                            break;
                        }
                        SessionEnd::Closed { code, reason } => {
                            warn!(endpoint = %self.endpoint, ?code, %reason, "Connection closed by server");
                        }
                        SessionEnd::Failed(e) => {
                            warn!(endpoint = %self.endpoint, error = %e, "Connection lost");
                            self.shared.emit_error(&e);
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(endpoint = %self.endpoint, attempt = failures, error = %e, "Connection attempt failed");
                    self.shared.emit_error(&e);
                }
            }

            if self.policy.exhausted(failures) {
                warn!(endpoint = %self.endpoint, failures, "Giving up on notification channel");
                self.shared.emit_error(&ClientError::RetriesExhausted(failures));
                break;
            }

            let delay = self.policy.delay(failures.saturating_sub(1));
            self.shared.set_state(ConnectionState::Backoff);
            info!("Reconnecting in {:?}...", delay);

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Closed);
        debug!(endpoint = %self.endpoint, "Notification channel task finished");
    }

    async fn pump(&mut self, transport: &mut dyn Transport) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return SessionEnd::Stopped,
                frame = transport.recv() => match frame {
                    Ok(Frame::Text(text)) => self.handle_text(&text),
                    Ok(Frame::Closed { code, reason }) => return SessionEnd::Closed { code, reason },
                    Err(e) => return SessionEnd::Failed(e),
                },
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match parse_message(text) {
            Ok(Some(event)) => {
                if let Some(dedup) = &mut self.dedup {
                    if !dedup.admit(&event) {
                        debug!(event = event.tag(), "Duplicate notification dropped");
                        return;
                    }
                }
                self.shared.emit_event(event);
            }
            Ok(None) => debug!("Ignoring message with unrecognized event"),
            Err(e) => warn!("Failed to parse message: {}", e),
        }
    }
}
