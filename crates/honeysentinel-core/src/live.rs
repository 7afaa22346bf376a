//! Push channel listener.
//!
//! The backend pushes verdict updates over a WebSocket. Updates are merged
//! straight into the enrichment store, bypassing the poll cycle, and always
//! leave the message `Ready`.
//!
//! Connection problems are never raised as errors; they are published as a
//! [`ConnectionState`] and the listener reconnects with exponential backoff
//! until shut down.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::model::AuthenticityPatch;
use crate::store::SharedStore;
use crate::Result;

/// Shortest delay between reconnect attempts.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

/// Push channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Receiving updates.
    Open,
    /// Not connected: closed by the server or not started.
    #[default]
    Closed,
    /// Connection failed or broke.
    Error,
}

impl ConnectionState {
    /// Convert to display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "live",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

/// Inbound push frame, keyed by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// New or changed data for one message.
    EmailUpdate {
        /// Message id.
        email_id: String,
        /// Changed fields.
        #[serde(default)]
        data: AuthenticityPatch,
    },
    /// Any frame type this client does not handle.
    #[serde(other)]
    Unknown,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Verdict merged for the id.
    Merged(String),
    /// Update for the id carried no verdict fields.
    NoAuthenticity(String),
    /// Unhandled frame type.
    Ignored,
    /// Frame was not valid JSON or had the wrong shape.
    Malformed,
}

/// Exponential reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial` and doubling up to `max`.
    ///
    /// `initial` is raised to [`MIN_RECONNECT_DELAY`] if shorter.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_RECONNECT_DELAY);
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Starts over from the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Long-lived push channel subscription feeding the enrichment store.
#[derive(Debug)]
pub struct LiveUpdateListener {
    url: Url,
    store: SharedStore,
    backoff: Backoff,
    state: watch::Sender<ConnectionState>,
}

impl LiveUpdateListener {
    /// Creates a listener for `url`.
    #[must_use]
    pub fn new(url: Url, store: SharedStore, backoff: Backoff) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            url,
            store,
            backoff,
            state,
        }
    }

    /// Creates a listener using the configured push URL and backoff.
    #[must_use]
    pub fn from_config(config: &Config, store: SharedStore) -> Self {
        Self::new(
            config.push_url.clone(),
            store,
            Backoff::new(config.reconnect_initial, config.reconnect_max),
        )
    }

    /// Subscribes to connection state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "push channel state");
        }
    }

    /// Decodes one text frame and merges any verdict it carries.
    pub fn apply_frame(&self, text: &str) -> FrameOutcome {
        match serde_json::from_str::<PushFrame>(text) {
            Ok(PushFrame::EmailUpdate { email_id, data }) => {
                if data.is_empty() {
                    debug!(id = email_id, "push update without verdict fields");
                    return FrameOutcome::NoAuthenticity(email_id);
                }
                let record = self.store.merge_patch(&email_id, data);
                info!(
                    id = email_id,
                    status = record.overall_status.as_str(),
                    "Merged pushed verdict"
                );
                FrameOutcome::Merged(email_id)
            }
            Ok(PushFrame::Unknown) => {
                debug!("Ignoring push frame of unknown type");
                FrameOutcome::Ignored
            }
            Err(e) => {
                warn!("Malformed push frame: {}", e);
                FrameOutcome::Malformed
            }
        }
    }

    /// One connection: handshake, then read frames until the server closes
    /// or the stream breaks. Reports whether the channel was opened.
    async fn session(&self) -> (bool, Result<()>) {
        let (mut ws, _) = match connect_async(self.url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => return (false, Err(e.into())),
        };
        info!("Push channel open at {}", self.url);
        self.set_state(ConnectionState::Open);

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    self.apply_frame(&text);
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => return (true, Err(e.into())),
            }
        }
        (true, Ok(()))
    }

    /// Runs until `shutdown` fires, reconnecting after every drop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let (opened, result) = tokio::select! {
                _ = shutdown.recv() => break,
                end = self.session() => end,
            };

            if opened {
                self.backoff.reset();
            }
            match result {
                Ok(()) => {
                    info!("Push channel closed by server");
                    self.set_state(ConnectionState::Closed);
                }
                Err(e) => {
                    warn!("Push channel error: {}", e);
                    self.set_state(ConnectionState::Error);
                }
            }

            let delay = self.backoff.next_delay();
            debug!("Reconnecting push channel in {:?}", delay);
            tokio::select! {
                _ = shutdown.recv() => break,
                () = sleep(delay) => {}
            }
        }
        self.set_state(ConnectionState::Closed);
        info!("Push channel listener stopped");
    }
}
