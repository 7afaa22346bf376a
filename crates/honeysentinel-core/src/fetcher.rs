//! Authenticity poll chains.
//!
//! The backend computes verdicts asynchronously: the first request starts
//! the computation and the endpoint answers `processing` until it is done.
//! A chain polls at a fixed interval until a verdict arrives, an error
//! occurs, or the maximum wait elapses, and records the outcome in the
//! store.
//!
//! A chain must only be started after [`SharedStore::mark_pending`]
//! returned `true` for the id.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::client::AuthenticitySource;
use crate::config::Config;
use crate::model::{AuthenticityRecord, PollResponse};
use crate::store::SharedStore;
use crate::Error;

/// Result of one poll cycle.
#[derive(Debug)]
pub enum PollStep {
    /// Backend still computing.
    Processing,
    /// Verdict ready.
    Done(AuthenticityRecord),
    /// Request or decode failed.
    Failed(Error),
}

/// How a poll chain ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Verdict stored.
    Completed,
    /// Chain gave up; the id is `Failed` in the store.
    Failed(Error),
    /// A verdict arrived but the store no longer tracked the id as pending
    /// or ready, so it was dropped.
    Discarded,
}

impl FetchOutcome {
    /// Whether a verdict was stored.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Runs poll chains against an [`AuthenticitySource`] and writes results
/// into the store.
#[derive(Debug)]
pub struct EnrichmentFetcher<S> {
    source: Arc<S>,
    store: SharedStore,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<S> Clone for EnrichmentFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: self.store.clone(),
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
        }
    }
}

impl<S: AuthenticitySource> EnrichmentFetcher<S> {
    /// Creates a fetcher with explicit timing.
    #[must_use]
    pub const fn new(
        source: Arc<S>,
        store: SharedStore,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            source,
            store,
            poll_interval,
            max_wait,
        }
    }

    /// Creates a fetcher using the configured timing.
    #[must_use]
    pub fn from_config(source: Arc<S>, store: SharedStore, config: &Config) -> Self {
        Self::new(source, store, config.poll_interval, config.max_poll_wait)
    }

    /// Store this fetcher writes into.
    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Performs one poll cycle without touching the store.
    pub async fn step(&self, id: &str) -> PollStep {
        match self.source.poll_authenticity(id).await {
            Ok(PollResponse::Processing) => PollStep::Processing,
            Ok(PollResponse::Ready(record)) => PollStep::Done(record),
            Err(e) => PollStep::Failed(e),
        }
    }

    /// Polls until a terminal outcome and records it in the store.
    ///
    /// Errors end the chain immediately without retry. The id becomes
    /// `Failed` and may be claimed again later.
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        // A wait too long to represent means no deadline.
        let deadline = Instant::now().checked_add(self.max_wait);
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            match self.step(id).await {
                PollStep::Processing => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        let err = Error::EnrichmentTimeout(self.max_wait.as_secs());
                        warn!(id, attempts, "Authenticity check timed out");
                        self.store.fail(id);
                        return FetchOutcome::Failed(err);
                    }
                    debug!(id, attempts, "Authenticity still processing");
                    sleep(self.poll_interval).await;
                }
                PollStep::Done(record) => {
                    info!(
                        id,
                        attempts,
                        status = record.overall_status.as_str(),
                        "Authenticity verdict ready"
                    );
                    if !self.store.complete(id, record) {
                        warn!(id, "Authenticity verdict discarded, id no longer claimed");
                        return FetchOutcome::Discarded;
                    }
                    return FetchOutcome::Completed;
                }
                PollStep::Failed(err) => {
                    warn!(id, attempts, "Authenticity check failed: {}", err);
                    self.store.fail(id);
                    return FetchOutcome::Failed(err);
                }
            }
        }
    }
}
