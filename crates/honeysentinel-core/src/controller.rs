//! Browsing controller.
//!
//! Joins the message collection with the enrichment store into a single
//! "current message" view, and enriches messages on demand: whenever the
//! current message changes and its verdict is neither ready nor in flight,
//! a poll chain is started for it.
//!
//! Chains are never cancelled by navigation. A chain for a message the user
//! has moved away from still lands in the store, so revisiting finds the
//! verdict ready.

use tokio::task::JoinSet;
use tracing::debug;

use crate::client::{AuthenticitySource, MessageSource};
use crate::collection::MessageCollection;
use crate::fetcher::{EnrichmentFetcher, FetchOutcome};
use crate::model::{AuthenticityRecord, Message};
use crate::store::{AcquisitionState, SharedStore};

/// Snapshot of the current message and its best-known verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView<'a> {
    /// The message.
    pub message: &'a Message,
    /// Acquisition state of its verdict.
    pub state: AcquisitionState,
    /// Verdict, when ready.
    pub authenticity: Option<AuthenticityRecord>,
    /// Zero-based index in the collection.
    pub position: usize,
    /// Number of messages in the collection.
    pub total: usize,
}

/// Navigation state over a message collection, with on-visit enrichment.
#[derive(Debug)]
pub struct BrowsingController<M, A> {
    collection: MessageCollection<M>,
    store: SharedStore,
    fetcher: EnrichmentFetcher<A>,
    current_index: usize,
    chains: JoinSet<(String, FetchOutcome)>,
}

impl<M: MessageSource, A: AuthenticitySource> BrowsingController<M, A> {
    /// Creates a controller. The fetcher must write into `store`.
    #[must_use]
    pub fn new(collection: MessageCollection<M>, fetcher: EnrichmentFetcher<A>) -> Self {
        Self {
            collection,
            store: fetcher.store().clone(),
            fetcher,
            current_index: 0,
            chains: JoinSet::new(),
        }
    }

    /// Loads a fresh collection and visits its first message.
    ///
    /// Like a hard refresh, verdicts for ids that are no longer in the
    /// collection are dropped. Returns whether the load succeeded; on
    /// failure the previous state is kept.
    pub async fn load(&mut self, page_size: u32) -> bool {
        if !self.collection.load(page_size).await {
            return false;
        }
        self.start_generation();
        true
    }

    /// Re-fetches the collection.
    ///
    /// A hard refresh resets the position to the first message and drops
    /// verdicts for ids that disappeared. A soft refresh keeps the position,
    /// clamped to the new length.
    pub async fn refresh(&mut self, hard: bool) -> bool {
        if !self.collection.refresh(hard).await {
            return false;
        }
        if hard {
            self.start_generation();
        } else {
            self.current_index = self
                .current_index
                .min(self.collection.len().saturating_sub(1));
            self.visit();
        }
        true
    }

    fn start_generation(&mut self) {
        self.store.retain(&self.collection.ids());
        self.current_index = 0;
        self.visit();
    }

    /// Moves to the next message. No-op at the last message.
    pub fn next(&mut self) -> bool {
        if self.current_index + 1 >= self.collection.len() {
            return false;
        }
        self.current_index += 1;
        self.visit();
        true
    }

    /// Moves to the previous message. No-op at the first message.
    pub fn prev(&mut self) -> bool {
        if self.current_index == 0 {
            return false;
        }
        self.current_index -= 1;
        self.visit();
        true
    }

    /// Jumps to `index`, clamped to the collection bounds.
    pub fn select(&mut self, index: usize) -> bool {
        let target = index.min(self.collection.len().saturating_sub(1));
        if target == self.current_index || self.collection.is_empty() {
            return false;
        }
        self.current_index = target;
        self.visit();
        true
    }

    /// Requests the verdict for the current message again, e.g. after it
    /// failed. Returns whether a new chain was started.
    pub fn retry(&mut self) -> bool {
        self.visit()
    }

    /// Starts a chain for the current message if its verdict is neither
    /// ready nor in flight.
    fn visit(&mut self) -> bool {
        self.reap();
        let Some(message) = self.collection.get(self.current_index) else {
            return false;
        };
        let id = message.id.clone();

        // Ready and Pending ids are refused here, which also keeps a second
        // chain from starting for an id already in flight.
        if !self.store.mark_pending(&id) {
            return false;
        }

        debug!(id, index = self.current_index, "Starting authenticity check");
        let fetcher = self.fetcher.clone();
        self.chains.spawn(async move {
            let outcome = fetcher.fetch(&id).await;
            (id, outcome)
        });
        true
    }

    /// Drops finished chains.
    fn reap(&mut self) {
        while let Some(result) = self.chains.try_join_next() {
            if let Err(e) = result {
                tracing::warn!("Authenticity chain aborted: {}", e);
            }
        }
    }

    /// Waits for every chain this controller started.
    pub async fn settle(&mut self) -> Vec<(String, FetchOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(result) = self.chains.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!("Authenticity chain aborted: {}", e),
            }
        }
        outcomes
    }

    /// Number of chains started and not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.chains.len()
    }

    /// Current message joined with its verdict.
    #[must_use]
    pub fn current(&self) -> Option<MessageView<'_>> {
        let message = self.collection.get(self.current_index)?;
        let enrichment = self.store.get(&message.id);
        Some(MessageView {
            message,
            state: enrichment.state,
            authenticity: enrichment.record,
            position: self.current_index,
            total: self.collection.len(),
        })
    }

    /// Current position.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    /// Underlying collection.
    #[must_use]
    pub const fn collection(&self) -> &MessageCollection<M> {
        &self.collection
    }

    /// Shared enrichment store.
    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{OverallStatus, PollResponse};
    use crate::{Error, Result};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixed(Vec<Message>);

    impl MessageSource for Fixed {
        async fn fetch_messages(&self, max_results: u32) -> Result<Vec<Message>> {
            Ok(self.0.iter().take(max_results as usize).cloned().collect())
        }
    }

    /// One page per load; the last page repeats.
    struct Pages(Mutex<VecDeque<Vec<Message>>>);

    impl MessageSource for Pages {
        async fn fetch_messages(&self, _max_results: u32) -> Result<Vec<Message>> {
            let mut pages = self.0.lock().unwrap();
            if pages.len() > 1 {
                return Ok(pages.pop_front().unwrap_or_default());
            }
            Ok(pages.front().cloned().unwrap_or_default())
        }
    }

    /// Answers every poll with a verdict and records which ids were asked.
    #[derive(Default)]
    struct Immediate(Mutex<Vec<String>>);

    impl AuthenticitySource for Immediate {
        async fn poll_authenticity(&self, id: &str) -> Result<PollResponse> {
            self.0.lock().unwrap().push(id.to_string());
            let mut record = AuthenticityRecord::empty(Utc::now());
            record.overall_status = OverallStatus::HighlyTrustworthy;
            Ok(PollResponse::Ready(record))
        }
    }

    struct Broken;

    impl AuthenticitySource for Broken {
        async fn poll_authenticity(&self, _id: &str) -> Result<PollResponse> {
            Err(Error::Status {
                status: 500,
                endpoint: "/authenticity".into(),
            })
        }
    }

    fn page(ids: &[&str]) -> Vec<Message> {
        ids.iter()
            .map(|id| serde_json::from_value(json!({ "id": id })).unwrap())
            .collect()
    }

    fn messages(n: usize) -> Vec<Message> {
        let ids: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
        page(&ids.iter().map(String::as_str).collect::<Vec<_>>())
    }

    fn controller_over<M: MessageSource, A: AuthenticitySource>(
        messages: M,
        source: Arc<A>,
    ) -> BrowsingController<M, A> {
        let store = SharedStore::new();
        let collection = MessageCollection::new(Arc::new(messages), 10);
        let fetcher =
            EnrichmentFetcher::new(source, store, Duration::from_secs(1), Duration::from_secs(5));
        BrowsingController::new(collection, fetcher)
    }

    fn controller<A: AuthenticitySource>(
        n: usize,
        source: Arc<A>,
    ) -> BrowsingController<Fixed, A> {
        controller_over(Fixed(messages(n)), source)
    }

    #[tokio::test]
    async fn test_bounds_are_clamped() {
        let mut c = controller(3, Arc::new(Immediate::default()));
        assert!(c.load(10).await);

        assert!(!c.prev());
        assert_eq!(c.current_index(), 0);
        assert!(c.next());
        assert!(c.next());
        assert!(!c.next());
        assert_eq!(c.current_index(), 2);
        assert!(!c.select(99));
        assert!(c.select(0));
        assert!(c.select(99));
        assert_eq!(c.current_index(), 2);
    }

    #[tokio::test]
    async fn test_ready_revisit_does_not_refetch() {
        let source = Arc::new(Immediate::default());
        let mut c = controller(2, Arc::clone(&source));
        assert!(c.load(10).await);
        c.settle().await;
        assert_eq!(c.current().unwrap().state, AcquisitionState::Ready);

        assert!(c.next());
        assert!(c.prev());
        c.settle().await;

        assert_eq!(*source.0.lock().unwrap(), vec!["m0", "m1"]);
        assert!(!c.retry());
    }

    #[tokio::test]
    async fn test_failed_message_is_retried_on_visit() {
        let mut c = controller(2, Arc::new(Broken));
        assert!(c.load(10).await);
        let outcomes = c.settle().await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].1.is_completed());
        assert_eq!(c.current().unwrap().state, AcquisitionState::Failed);

        assert!(c.retry());
        assert_eq!(c.current().unwrap().state, AcquisitionState::Pending);
        c.settle().await;
    }

    #[tokio::test]
    async fn test_empty_collection_has_no_view() {
        let mut c = controller(0, Arc::new(Immediate::default()));
        assert!(c.load(10).await);
        assert!(c.current().is_none());
        assert!(!c.next());
        assert!(!c.select(3));
        assert_eq!(c.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_view_joins_message_and_verdict() {
        let mut c = controller(3, Arc::new(Immediate::default()));
        assert!(c.load(10).await);
        c.settle().await;

        let view = c.current().unwrap();
        assert_eq!(view.message.id, "m0");
        assert_eq!(view.position, 0);
        assert_eq!(view.total, 3);
        assert_eq!(
            view.authenticity.unwrap().overall_status,
            OverallStatus::HighlyTrustworthy
        );
    }

    #[tokio::test]
    async fn test_soft_refresh_clamps_to_shorter_collection() {
        let source = Arc::new(Immediate::default());
        let pages = Pages(Mutex::new(
            vec![page(&["m0", "m1", "m2"]), page(&["n0"])].into(),
        ));
        let mut c = controller_over(pages, Arc::clone(&source));
        assert!(c.load(10).await);
        assert!(c.select(2));
        c.settle().await;

        assert!(c.refresh(false).await);
        assert_eq!(c.current_index(), 0);
        let view = c.current().unwrap();
        assert_eq!(view.message.id, "n0");
        assert_eq!(view.total, 1);
        // The clamped position counts as a visit.
        assert_eq!(c.in_flight(), 1);
        c.settle().await;
        assert_eq!(*source.0.lock().unwrap(), vec!["m0", "m2", "n0"]);

        assert!(!c.next());
        assert!(!c.select(5));
    }
}
