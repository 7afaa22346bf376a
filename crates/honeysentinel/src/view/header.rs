//! Status line.

use std::fmt::{self, Write};

use super::Screen;

/// Renders the status line: position, verdict counts and push channel state.
pub fn view_header(out: &mut String, screen: &Screen<'_>) -> fmt::Result {
    write!(out, "HoneySentinel")?;
    if let Some(view) = &screen.current {
        write!(out, "  [{}/{}]", view.position + 1, view.total)?;
    }

    let counts = screen.counts;
    write!(out, "  verdicts: {} ready", counts.ready)?;
    if counts.pending > 0 {
        write!(out, ", {} checking", counts.pending)?;
    }
    if counts.failed > 0 {
        write!(out, ", {} failed", counts.failed)?;
    }

    writeln!(out, "  push: {}", screen.connection.as_str())
}
