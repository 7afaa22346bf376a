//! Wires the browsing components to the live backend.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::collection::MessageCollection;
use crate::config::Config;
use crate::controller::BrowsingController;
use crate::fetcher::EnrichmentFetcher;
use crate::live::{ConnectionState, LiveUpdateListener};
use crate::store::SharedStore;
use crate::Result;

/// A running client session: one store shared by the poll chains and the
/// push listener, and the controller the front end drives.
#[derive(Debug)]
pub struct Session {
    config: Config,
    client: Arc<ApiClient>,
    controller: BrowsingController<ApiClient, ApiClient>,
    connection: watch::Receiver<ConnectionState>,
    shutdown: broadcast::Sender<()>,
    listener: JoinHandle<()>,
}

impl Session {
    /// Builds the components and starts the push listener in the
    /// background. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn start(config: Config) -> Result<Self> {
        let client = Arc::new(ApiClient::new(&config)?);
        let store = SharedStore::new();

        let collection = MessageCollection::new(Arc::clone(&client), config.page_size);
        let fetcher = EnrichmentFetcher::from_config(Arc::clone(&client), store.clone(), &config);
        let controller = BrowsingController::new(collection, fetcher);

        let listener = LiveUpdateListener::from_config(&config, store);
        let connection = listener.subscribe();
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let listener = tokio::spawn(listener.run(shutdown_rx));

        info!(api = %config.api_base, push = %config.push_url, "Session started");
        Ok(Self {
            config,
            client,
            controller,
            connection,
            shutdown,
            listener,
        })
    }

    /// Loads the first page of messages using the configured page size.
    pub async fn open(&mut self) -> bool {
        let page_size = self.config.page_size;
        self.controller.load(page_size).await
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Browsing controller.
    #[must_use]
    pub const fn controller(&self) -> &BrowsingController<ApiClient, ApiClient> {
        &self.controller
    }

    /// Browsing controller, for navigation.
    pub const fn controller_mut(&mut self) -> &mut BrowsingController<ApiClient, ApiClient> {
        &mut self.controller
    }

    /// Backend client, for feedback and domain lookups.
    #[must_use]
    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }

    /// Latest push channel state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Receiver notified on every push channel state change.
    #[must_use]
    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Stops the push listener. Poll chains still in flight are aborted.
    pub async fn shutdown(self) {
        let in_flight = self.controller.in_flight();
        // The listener may already have exited; nothing to signal then.
        let _ = self.shutdown.send(());
        if let Err(e) = self.listener.await {
            warn!("Push listener task failed: {}", e);
        }
        drop(self.controller);
        info!(in_flight, "Session closed");
    }
}
