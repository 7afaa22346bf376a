//! In-memory message collection.
//!
//! Each load replaces the whole collection with a fresh bulk fetch;
//! pagination is an index into this list, owned by the
//! [`BrowsingController`](crate::BrowsingController).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::Error;
use crate::client::MessageSource;
use crate::model::Message;

/// Ordered list of analyzed messages from the last bulk load.
#[derive(Debug)]
pub struct MessageCollection<M> {
    source: Arc<M>,
    messages: Vec<Message>,
    page_size: u32,
    generation: u64,
    error: Option<Error>,
}

impl<M: MessageSource> MessageCollection<M> {
    /// Creates an empty collection backed by `source`.
    #[must_use]
    pub const fn new(source: Arc<M>, page_size: u32) -> Self {
        Self {
            source,
            messages: Vec::new(),
            page_size,
            generation: 0,
            error: None,
        }
    }

    /// Fetches up to `page_size` messages and replaces the collection.
    ///
    /// On failure the previous messages are kept and the error is recorded
    /// in [`error`](Self::error). Returns whether the load succeeded.
    pub async fn load(&mut self, page_size: u32) -> bool {
        self.page_size = page_size;
        match self.source.fetch_messages(page_size).await {
            Ok(messages) => {
                info!("Loaded {} messages", messages.len());
                self.messages = messages;
                self.generation += 1;
                self.error = None;
                true
            }
            Err(e) => {
                warn!("Failed to load messages: {}", e);
                self.error = Some(e);
                false
            }
        }
    }

    /// Re-issues the last bulk fetch.
    ///
    /// A hard refresh starts a new id generation. A soft refresh relies on
    /// the backend returning the same ids, and keeps the generation.
    pub async fn refresh(&mut self, hard: bool) -> bool {
        let previous: HashSet<String> = if hard { HashSet::new() } else { self.ids() };
        let generation = self.generation;

        if !self.load(self.page_size).await {
            return false;
        }
        if !hard {
            self.generation = generation;
            if !previous.is_empty() && self.messages.iter().any(|m| !previous.contains(&m.id)) {
                warn!("Soft refresh returned ids from a different generation");
            }
        }
        true
    }

    /// Message at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Index of the message with the given id.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Ids of all loaded messages.
    #[must_use]
    pub fn ids(&self) -> HashSet<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }

    /// Loaded messages, in backend order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of loaded messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Page size used by the last load.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Counter bumped by every load and hard refresh.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Error from the last failed load, cleared by a successful one.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}
