//! # honeysentinel-core
//!
//! Core logic for the `HoneySentinel` mail analysis client.
//!
//! This crate provides:
//! - The analyzed message model (metadata, body, links, attachments)
//! - **Enrichment store** - per-message sender authenticity cache with
//!   acquisition state tracking
//! - **Enrichment fetcher** - polls the backend's slow authenticity endpoint
//!   until a verdict is ready
//! - **Live updates** - merges pushed verdicts from the backend's WebSocket
//! - **Browsing** - paginated message collection and a controller that
//!   enriches messages as the user navigates to them
//! - HTTP client for the analysis backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod collection;
pub mod config;
pub mod controller;
mod error;
pub mod fetcher;
pub mod live;
pub mod model;
pub mod session;
pub mod store;

pub use client::{ApiClient, AuthenticitySource, DomainCheck, FeedbackLabel, MessageSource};
pub use collection::MessageCollection;
pub use config::{Config, ConfigBuilder};
pub use controller::{BrowsingController, MessageView};
pub use error::{Error, Result};
pub use fetcher::{EnrichmentFetcher, FetchOutcome, PollStep};
pub use live::{
    Backoff, ConnectionState, FrameOutcome, LiveUpdateListener, MIN_RECONNECT_DELAY, PushFrame,
};
pub use model::{
    Attachment, AuthenticityPatch, AuthenticityRecord, Body, Link, Mechanism, MechanismResult,
    MechanismResults, Message, MessageMetadata, OverallStatus, PollResponse, ScanStatus,
};
pub use session::Session;
pub use store::{AcquisitionState, Enrichment, EnrichmentStore, RecordSource, SharedStore, StateCounts};
