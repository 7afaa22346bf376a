//! Text views for the terminal front end.
//!
//! Views render to plain strings; the main loop decides when to print them.

mod header;
mod message_view;

use std::fmt::{self, Write};

use chrono::{DateTime, Local};

use honeysentinel_core::{ConnectionState, MessageView, StateCounts};

pub use header::view_header;
pub use message_view::view_message;

/// Everything one screen shows.
pub struct Screen<'a> {
    /// Current message, if any is loaded.
    pub current: Option<MessageView<'a>>,
    /// Push channel state.
    pub connection: ConnectionState,
    /// Verdict counts across the collection.
    pub counts: StateCounts,
    /// Last load error, shown when there is nothing to browse.
    pub load_error: Option<String>,
    /// One-line status from the last command.
    pub notice: Option<&'a str>,
    /// Command reference, when toggled on.
    pub help: Option<&'a str>,
}

/// Renders a full screen.
///
/// # Errors
///
/// Propagates formatter errors.
pub fn render(screen: &Screen<'_>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    view_header(&mut out, screen)?;
    writeln!(out)?;

    match &screen.current {
        Some(view) => view_message(&mut out, view)?,
        None => view_empty(&mut out, screen.load_error.as_deref())?,
    }

    if let Some(help) = screen.help {
        writeln!(out)?;
        writeln!(out, "{help}")?;
    }
    if let Some(notice) = screen.notice {
        writeln!(out)?;
        writeln!(out, "{notice}")?;
    }
    write!(out, "\n> ")?;
    Ok(out)
}

/// Renders the empty state when no message is loaded.
fn view_empty(out: &mut String, load_error: Option<&str>) -> fmt::Result {
    match load_error {
        Some(error) => writeln!(out, "Could not load messages: {error}\nPress r to try again."),
        None => writeln!(out, "No messages."),
    }
}

/// Formats an RFC 2822 date string to local time.
///
/// Converts dates like "Thu, 15 Jan 2026 19:31:43 +0000" to the local
/// timezone. Unparseable dates are returned unchanged.
pub fn format_date_local(date: &str) -> String {
    DateTime::parse_from_rfc2822(date)
        .or_else(|_| DateTime::parse_from_rfc3339(date))
        .map_or_else(
            |_| date.to_string(),
            |dt| {
                dt.with_timezone(&Local)
                    .format("%a, %d %b %Y %H:%M:%S")
                    .to_string()
            },
        )
}

/// Formats a byte count for display.
#[allow(clippy::cast_precision_loss)] // Display only
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
