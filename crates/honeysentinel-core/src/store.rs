//! Enrichment store.
//!
//! Single source of truth for sender authenticity verdicts, keyed by message
//! id. Each id carries an [`AcquisitionState`] and, once ready, an
//! [`AuthenticityRecord`].
//!
//! The store is plain in-memory state. [`EnrichmentStore::mark_pending`] is
//! the serialization point that guarantees at most one fetch chain per id:
//! callers must only start a fetch when it returns `true`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use crate::model::{AuthenticityPatch, AuthenticityRecord};

/// Lifecycle of the authenticity verdict for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// Nothing requested yet.
    #[default]
    NotRequested,
    /// A fetch chain is in flight.
    Pending,
    /// A verdict is stored.
    Ready,
    /// The last fetch failed; eligible for retry.
    Failed,
}

impl AcquisitionState {
    /// Whether a fetch may be started from this state.
    #[must_use]
    pub const fn is_fetchable(self) -> bool {
        matches!(self, Self::NotRequested | Self::Failed)
    }

    /// Convert to display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not requested",
            Self::Pending => "checking",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Where the stored verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Completed poll chain.
    Poll,
    /// Push channel update.
    Push,
}

/// Read view of one store entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Enrichment {
    /// Acquisition state.
    pub state: AcquisitionState,
    /// Verdict, present whenever `state` is `Ready`.
    pub record: Option<AuthenticityRecord>,
    /// Origin of `record`.
    pub source: Option<RecordSource>,
    /// Arrival order of `record` across the whole store (0 if none).
    pub sequence: u64,
}

/// Number of tracked entries per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateCounts {
    /// Entries with a fetch in flight.
    pub pending: usize,
    /// Entries with a verdict.
    pub ready: usize,
    /// Entries whose last fetch failed.
    pub failed: usize,
}

/// Per-message verdict cache with acquisition state tracking.
#[derive(Debug, Default)]
pub struct EnrichmentStore {
    entries: HashMap<String, Enrichment>,
    next_sequence: u64,
}

impl EnrichmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state and verdict for an id. Unknown ids read as
    /// `NotRequested` with no record.
    #[must_use]
    pub fn get(&self, id: &str) -> Enrichment {
        self.entries.get(id).cloned().unwrap_or_default()
    }

    /// Current state for an id.
    #[must_use]
    pub fn state(&self, id: &str) -> AcquisitionState {
        self.entries
            .get(id)
            .map_or(AcquisitionState::NotRequested, |e| e.state)
    }

    /// Claims the id for a new fetch chain.
    ///
    /// Moves `NotRequested` or `Failed` to `Pending` and returns `true`.
    /// Returns `false` without changes if the id is already `Pending` or
    /// `Ready`.
    pub fn mark_pending(&mut self, id: &str) -> bool {
        let entry = self.entries.entry(id.to_string()).or_default();
        if !entry.state.is_fetchable() {
            return false;
        }
        debug!(id, from = entry.state.as_str(), "enrichment pending");
        entry.state = AcquisitionState::Pending;
        true
    }

    /// Stores a verdict from a finished poll chain.
    ///
    /// Accepted from `Pending`, and from `Ready` when a push landed while the
    /// chain was in flight; the later arrival wins. Completions for ids the
    /// store no longer tracks, or that already failed, are dropped. Returns
    /// whether the verdict was stored.
    pub fn complete(&mut self, id: &str, record: AuthenticityRecord) -> bool {
        let sequence = self.next_sequence + 1;
        let Some(entry) = self.entries.get_mut(id) else {
            debug!(id, "dropping completion for untracked id");
            return false;
        };
        match entry.state {
            AcquisitionState::Pending | AcquisitionState::Ready => {
                if entry.source == Some(RecordSource::Push) {
                    debug!(id, "poll completion overwrites pushed verdict");
                }
                entry.state = AcquisitionState::Ready;
                entry.record = Some(record);
                entry.source = Some(RecordSource::Poll);
                entry.sequence = sequence;
                self.next_sequence = sequence;
                true
            }
            AcquisitionState::NotRequested | AcquisitionState::Failed => {
                debug!(id, state = entry.state.as_str(), "dropping stale completion");
                false
            }
        }
    }

    /// Marks an in-flight fetch as failed. No-op unless the id is `Pending`.
    /// Returns whether the state changed.
    pub fn fail(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.state == AcquisitionState::Pending => {
                debug!(id, "enrichment failed");
                entry.state = AcquisitionState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Stores a pushed verdict, from any state. Always ends `Ready`.
    pub fn merge_push(&mut self, id: &str, record: AuthenticityRecord) {
        self.next_sequence += 1;
        let entry = self.entries.entry(id.to_string()).or_default();
        debug!(id, from = entry.state.as_str(), "merging pushed verdict");
        entry.state = AcquisitionState::Ready;
        entry.record = Some(record);
        entry.source = Some(RecordSource::Push);
        entry.sequence = self.next_sequence;
    }

    /// Overlays a partial pushed update onto the known verdict (or an empty
    /// one) and merges the result. Returns the merged record.
    pub fn merge_patch(&mut self, id: &str, patch: AuthenticityPatch) -> AuthenticityRecord {
        let base = self
            .entries
            .get(id)
            .and_then(|e| e.record.clone())
            .unwrap_or_else(|| AuthenticityRecord::empty(Utc::now()));
        let record = patch.apply(base);
        self.merge_push(id, record.clone());
        record
    }

    /// Drops every entry whose id is not in `ids`.
    ///
    /// `Pending` entries are kept regardless: their poll task is still
    /// running and owns the id until it completes or fails.
    pub fn retain(&mut self, ids: &HashSet<String>) {
        let before = self.entries.len();
        self.entries
            .retain(|id, e| ids.contains(id) || e.state == AcquisitionState::Pending);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "dropped enrichment for stale ids");
        }
    }

    /// Number of tracked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no ids are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries per state.
    #[must_use]
    pub fn counts(&self) -> StateCounts {
        self.entries
            .values()
            .fold(StateCounts::default(), |mut counts, entry| {
                match entry.state {
                    AcquisitionState::Pending => counts.pending += 1,
                    AcquisitionState::Ready => counts.ready += 1,
                    AcquisitionState::Failed => counts.failed += 1,
                    AcquisitionState::NotRequested => {}
                }
                counts
            })
    }
}

/// Cloneable handle to a store shared between the controller, fetch chains
/// and the push listener.
///
/// Every call locks for one store operation; the lock is never held across
/// an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<EnrichmentStore>>,
}

impl SharedStore {
    /// Creates a handle to a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EnrichmentStore> {
        // Store operations cannot leave the map half-updated, so a poisoned
        // lock still guards consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`EnrichmentStore::get`].
    #[must_use]
    pub fn get(&self, id: &str) -> Enrichment {
        self.lock().get(id)
    }

    /// See [`EnrichmentStore::state`].
    #[must_use]
    pub fn state(&self, id: &str) -> AcquisitionState {
        self.lock().state(id)
    }

    /// See [`EnrichmentStore::mark_pending`].
    #[must_use]
    pub fn mark_pending(&self, id: &str) -> bool {
        self.lock().mark_pending(id)
    }

    /// See [`EnrichmentStore::complete`].
    pub fn complete(&self, id: &str, record: AuthenticityRecord) -> bool {
        self.lock().complete(id, record)
    }

    /// See [`EnrichmentStore::fail`].
    pub fn fail(&self, id: &str) -> bool {
        self.lock().fail(id)
    }

    /// See [`EnrichmentStore::merge_push`].
    pub fn merge_push(&self, id: &str, record: AuthenticityRecord) {
        self.lock().merge_push(id, record);
    }

    /// See [`EnrichmentStore::merge_patch`].
    pub fn merge_patch(&self, id: &str, patch: AuthenticityPatch) -> AuthenticityRecord {
        self.lock().merge_patch(id, patch)
    }

    /// See [`EnrichmentStore::retain`].
    pub fn retain(&self, ids: &HashSet<String>) {
        self.lock().retain(ids);
    }

    /// See [`EnrichmentStore::len`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// See [`EnrichmentStore::is_empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// See [`EnrichmentStore::counts`].
    #[must_use]
    pub fn counts(&self) -> StateCounts {
        self.lock().counts()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::OverallStatus;
    use proptest::prelude::*;

    fn record(status: OverallStatus) -> AuthenticityRecord {
        let mut r = AuthenticityRecord::empty(Utc::now());
        r.domain = "example.com".into();
        r.overall_status = status;
        r
    }

    #[test]
    fn test_unknown_id_reads_not_requested() {
        let store = EnrichmentStore::new();
        let e = store.get("nope");
        assert_eq!(e.state, AcquisitionState::NotRequested);
        assert!(e.record.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_pending_only_once() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));
        assert!(!store.mark_pending("a"));
        assert_eq!(store.state("a"), AcquisitionState::Pending);
    }

    #[test]
    fn test_complete_then_no_refetch() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));
        assert!(store.complete("a", record(OverallStatus::HighlyTrustworthy)));

        let e = store.get("a");
        assert_eq!(e.state, AcquisitionState::Ready);
        assert_eq!(e.source, Some(RecordSource::Poll));
        assert_eq!(
            e.record.unwrap().overall_status,
            OverallStatus::HighlyTrustworthy
        );
        assert!(!store.mark_pending("a"));
    }

    #[test]
    fn test_fail_allows_retry() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));
        assert!(store.fail("a"));
        assert_eq!(store.state("a"), AcquisitionState::Failed);
        assert!(store.mark_pending("a"));
    }

    #[test]
    fn test_fail_outside_pending_is_noop() {
        let mut store = EnrichmentStore::new();
        assert!(!store.fail("a"));
        store.merge_push("a", record(OverallStatus::Untrustworthy));
        assert!(!store.fail("a"));
        assert_eq!(store.state("a"), AcquisitionState::Ready);
    }

    #[test]
    fn test_complete_for_untracked_or_failed_is_dropped() {
        let mut store = EnrichmentStore::new();
        assert!(!store.complete("gone", record(OverallStatus::Unknown)));
        assert!(store.is_empty());

        assert!(store.mark_pending("a"));
        assert!(store.fail("a"));
        assert!(!store.complete("a", record(OverallStatus::Unknown)));
        assert_eq!(store.state("a"), AcquisitionState::Failed);
    }

    #[test]
    fn test_push_during_poll_then_poll_wins() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));

        store.merge_push("a", record(OverallStatus::Untrustworthy));
        let pushed = store.get("a");
        assert_eq!(pushed.state, AcquisitionState::Ready);
        assert_eq!(pushed.source, Some(RecordSource::Push));
        assert_eq!(
            pushed.record.unwrap().overall_status,
            OverallStatus::Untrustworthy
        );

        assert!(store.complete("a", record(OverallStatus::HighlyTrustworthy)));
        let polled = store.get("a");
        assert_eq!(polled.source, Some(RecordSource::Poll));
        assert!(polled.sequence > pushed.sequence);
        assert_eq!(
            polled.record.unwrap().overall_status,
            OverallStatus::HighlyTrustworthy
        );
    }

    #[test]
    fn test_merge_patch_overlays_known_record() {
        let mut store = EnrichmentStore::new();
        store.merge_push("a", record(OverallStatus::HighlyTrustworthy));

        let patch = AuthenticityPatch {
            overall_status: Some(OverallStatus::Untrustworthy),
            ..AuthenticityPatch::default()
        };
        let merged = store.merge_patch("a", patch);
        assert_eq!(merged.domain, "example.com");
        assert_eq!(merged.overall_status, OverallStatus::Untrustworthy);
        assert_eq!(store.get("a").record, Some(merged));
    }

    #[test]
    fn test_retain_and_counts() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));
        assert!(store.mark_pending("b"));
        assert!(store.fail("b"));
        store.merge_push("c", record(OverallStatus::Unknown));

        assert_eq!(
            store.counts(),
            StateCounts {
                pending: 1,
                ready: 1,
                failed: 1
            }
        );

        let keep: HashSet<String> = ["c".to_string()].into_iter().collect();
        store.retain(&keep);
        assert_eq!(store.len(), 2);
        assert_eq!(store.state("b"), AcquisitionState::NotRequested);
        assert_eq!(store.state("c"), AcquisitionState::Ready);
    }

    #[test]
    fn test_retain_keeps_claimed_ids() {
        let mut store = EnrichmentStore::new();
        assert!(store.mark_pending("a"));

        store.retain(&HashSet::new());
        assert_eq!(store.state("a"), AcquisitionState::Pending);
        // The running poll still holds the claim.
        assert!(!store.mark_pending("a"));
        assert!(store.complete("a", record(OverallStatus::Unknown)));

        store.retain(&HashSet::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_store_handles_see_same_state() {
        let store = SharedStore::new();
        let other = store.clone();
        assert!(store.mark_pending("a"));
        assert!(!other.mark_pending("a"));
        other.merge_push("a", record(OverallStatus::Untrustworthy));
        assert_eq!(store.state("a"), AcquisitionState::Ready);
    }

    #[derive(Debug, Clone)]
    enum Op {
        MarkPending,
        Complete,
        Fail,
        Push,
    }

    fn op() -> impl Strategy<Value = (usize, Op)> {
        (
            0..3usize,
            prop_oneof![
                Just(Op::MarkPending),
                Just(Op::Complete),
                Just(Op::Fail),
                Just(Op::Push),
            ],
        )
    }

    proptest! {
        #[test]
        fn prop_single_claim_and_ready_has_record(ops in proptest::collection::vec(op(), 0..64)) {
            let ids = ["a", "b", "c"];
            let mut store = EnrichmentStore::new();
            let mut claimed = [false; 3];

            for (idx, op) in ops {
                let id = ids[idx];
                match op {
                    Op::MarkPending => {
                        let was = store.state(id);
                        let granted = store.mark_pending(id);
                        prop_assert_eq!(granted, was.is_fetchable());
                        if granted {
                            prop_assert!(!claimed[idx], "second concurrent claim for {}", id);
                            claimed[idx] = true;
                        }
                    }
                    Op::Complete => {
                        if store.complete(id, record(OverallStatus::HighlyTrustworthy)) {
                            claimed[idx] = false;
                        }
                    }
                    Op::Fail => {
                        if store.fail(id) {
                            claimed[idx] = false;
                        }
                    }
                    Op::Push => {
                        let r = record(OverallStatus::Untrustworthy);
                        store.merge_push(id, r.clone());
                        claimed[idx] = false;
                        let e = store.get(id);
                        prop_assert_eq!(e.state, AcquisitionState::Ready);
                        prop_assert_eq!(e.record, Some(r));
                    }
                }

                for id in ids {
                    let e = store.get(id);
                    if e.state == AcquisitionState::Ready {
                        prop_assert!(e.record.is_some());
                    }
                }
            }
        }
    }
}
