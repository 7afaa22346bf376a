//! Domain models.
//!
//! Messages come from the backend's bulk fetch and are immutable once
//! loaded. Authenticity verdicts are modeled separately because they arrive
//! later, through polling or the push channel, and are cached by message id.

mod authenticity;
mod message;

pub use authenticity::{
    AuthenticityPatch, AuthenticityRecord, Mechanism, MechanismResult, MechanismResults,
    OverallStatus, PollResponse,
};
pub use message::{Attachment, Body, Link, Message, MessageMetadata, ScanStatus};
