//! Message types for application events.
//!
//! Every state change goes through [`Message`]: typed commands from the
//! prompt and results of background requests alike.

use honeysentinel_core::{DomainCheck, FeedbackLabel};

/// Application messages (events).
#[derive(Debug, Clone)]
pub enum Message {
    // Navigation
    /// Show the next message.
    Next,
    /// Show the previous message.
    Prev,
    /// Jump to a 1-based position.
    Select(usize),

    // Collection
    /// Re-fetch the collection. A hard refresh starts over at the first
    /// message and forgets verdicts for ids that disappeared.
    Refresh {
        /// Hard refresh.
        hard: bool,
    },

    // Authenticity
    /// Request the verdict for the current message again.
    CheckAuthenticity,
    /// Look up the sender's domain reputation.
    LookupDomain,
    /// Domain lookup finished.
    DomainChecked(Result<DomainCheck, String>),

    // Feedback
    /// Classify a link of the current message (1-based).
    Feedback {
        /// Link number as shown.
        link: usize,
        /// Classification.
        label: FeedbackLabel,
    },
    /// Feedback request finished.
    FeedbackSent(Result<String, String>),

    // UI
    /// Toggle the command help.
    ToggleHelp,
    /// Leave the application.
    Quit,
}

impl Message {
    /// Parses one line typed at the prompt.
    ///
    /// # Errors
    ///
    /// Returns a user-facing description if the line is not a command.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err("type ? for help".to_string());
        };

        let message = match command {
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Prev,
            "g" | "go" => Self::Select(parse_number(words.next(), "position")?),
            "r" | "refresh" => Self::Refresh { hard: false },
            "R" | "reload" => Self::Refresh { hard: true },
            "c" | "check" => Self::CheckAuthenticity,
            "d" | "domain" => Self::LookupDomain,
            "f" | "feedback" => {
                let link = parse_number(words.next(), "link number")?;
                let label = words
                    .next()
                    .and_then(FeedbackLabel::parse)
                    .ok_or("label must be one of safe, marketing, phishing, scam")?;
                Self::Feedback { link, label }
            }
            "?" | "h" | "help" => Self::ToggleHelp,
            "q" | "quit" => Self::Quit,
            // A bare number jumps to that message.
            other => match other.parse::<usize>() {
                Ok(position) if position > 0 => Self::Select(position),
                _ => return Err(format!("unknown command {other:?}, type ? for help")),
            },
        };

        if let Some(extra) = words.next() {
            return Err(format!("unexpected argument {extra:?}"));
        }
        Ok(message)
    }
}

fn parse_number(word: Option<&str>, what: &str) -> Result<usize, String> {
    match word.map(str::parse::<usize>) {
        Some(Ok(n)) if n > 0 => Ok(n),
        _ => Err(format!("expected a {what} starting at 1")),
    }
}

/// Command reference shown by `?`.
pub const HELP: &str = "\
  n / p             next / previous message
  g <n>, <n>        jump to message n
  r / R             refresh / reload from the first message
  c                 check sender authenticity again
  d                 look up the sender's domain
  f <link> <label>  report a link as safe, marketing, phishing or scam
  ?                 toggle this help
  q                 quit";
