//! Message content view.

use std::fmt::{self, Write};

use chrono::Local;
use honeysentinel_core::{AcquisitionState, AuthenticityRecord, Body, MessageView, ScanStatus};
use tracing::debug;

use super::{format_date_local, format_size};

/// Body lines shown before the rest is elided.
const BODY_PREVIEW_LINES: usize = 40;

/// Renders headers, sender authenticity, body, links and attachments.
pub fn view_message(out: &mut String, view: &MessageView<'_>) -> fmt::Result {
    let meta = &view.message.metadata;
    writeln!(out, "From:    {}", meta.from)?;
    if !meta.to.is_empty() {
        writeln!(out, "To:      {}", meta.to)?;
    }
    writeln!(out, "Subject: {}", meta.subject)?;
    if !meta.date.is_empty() {
        writeln!(out, "Date:    {}", format_date_local(&meta.date))?;
    }
    writeln!(out)?;

    view_authenticity(out, view.state, view.authenticity.as_ref())?;
    writeln!(out)?;
    view_body(out, &view.message.body)?;
    view_links(out, view)?;
    view_attachments(out, view)
}

/// Renders the sender authenticity panel for the given acquisition state.
fn view_authenticity(
    out: &mut String,
    state: AcquisitionState,
    record: Option<&AuthenticityRecord>,
) -> fmt::Result {
    match (state, record) {
        (AcquisitionState::Ready, Some(record)) => {
            writeln!(
                out,
                "Sender authenticity: {}  ({}, updated {})",
                record.overall_status.display_name(),
                if record.domain.is_empty() { "unknown domain" } else { record.domain.as_str() },
                record
                    .last_updated
                    .with_timezone(&Local)
                    .format("%H:%M:%S")
            )?;
            for (mechanism, result) in record.mechanisms.iter() {
                write!(out, "  {:<6} {}", mechanism.as_str().to_uppercase(), result.status)?;
                if let Some(first) = result.records.first() {
                    write!(out, "  {first}")?;
                }
                writeln!(out)?;
            }
            writeln!(
                out,
                "  Address syntax {}",
                if record.email_syntax_valid { "valid" } else { "invalid" }
            )
        }
        (AcquisitionState::Pending, _) => writeln!(out, "Sender authenticity: checking..."),
        (AcquisitionState::Failed, _) => {
            writeln!(out, "Sender authenticity: check failed (press c to retry)")
        }
        _ => writeln!(out, "Sender authenticity: not checked"),
    }
}

fn view_body(out: &mut String, body: &Body) -> fmt::Result {
    let text = match body {
        Body::Html(html) => htmd::convert(html).unwrap_or_else(|e| {
            debug!("HTML conversion failed, showing raw body: {}", e);
            html.clone()
        }),
        Body::Text(text) => text.clone(),
    };

    let lines: Vec<&str> = text.trim().lines().collect();
    for line in lines.iter().take(BODY_PREVIEW_LINES) {
        writeln!(out, "{line}")?;
    }
    if lines.len() > BODY_PREVIEW_LINES {
        writeln!(out, "... ({} more lines)", lines.len() - BODY_PREVIEW_LINES)?;
    }
    Ok(())
}

fn view_links(out: &mut String, view: &MessageView<'_>) -> fmt::Result {
    let links = &view.message.links;
    if links.is_empty() {
        return Ok(());
    }

    let flagged = view.message.unsafe_link_count();
    writeln!(out)?;
    if flagged > 0 {
        writeln!(out, "Links ({flagged} flagged unsafe):")?;
    } else {
        writeln!(out, "Links:")?;
    }
    for (i, link) in links.iter().enumerate() {
        write!(out, "  {}. {}", i + 1, link.url)?;
        match link.scan_status {
            ScanStatus::Unknown => {}
            status => write!(out, "  [{}]", status.as_str())?,
        }
        if !link.scan_details.is_empty() {
            write!(out, " {}", link.scan_details.join(", "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn view_attachments(out: &mut String, view: &MessageView<'_>) -> fmt::Result {
    let attachments = &view.message.attachments;
    if attachments.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Attachments:")?;
    for attachment in attachments {
        writeln!(
            out,
            "  - {} ({}, {})",
            attachment.filename,
            attachment.mime_type,
            format_size(attachment.size_bytes)
        )?;
    }
    Ok(())
}
