//! `HoneySentinel` - terminal browser for analyzed mail
//!
//! Shows one analyzed message at a time with its sender authenticity
//! verdict. Verdicts are fetched on demand as you browse and updated live
//! from the backend's push channel.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod message;
mod view;

use std::io::Write as _;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use honeysentinel_core::{Config, FeedbackLabel, Session};
use message::{HELP, Message};
use view::Screen;

/// How often the screen is re-rendered to pick up background changes.
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the screen.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "honeysentinel=info,honeysentinel_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting HoneySentinel");

    let config = Config::load().await.context("failed to load settings")?;
    let session = Session::start(config).context("failed to start session")?;
    let (tx, rx) = mpsc::unbounded_channel();

    let mut app = HoneySentinel::new(session, tx);
    app.open().await;
    let result = app.run(rx).await;
    app.session.shutdown().await;
    result
}

/// Main application state.
struct HoneySentinel {
    /// Backend session.
    session: Session,
    /// Sender for results of background requests.
    tx: mpsc::UnboundedSender<Message>,
    /// One-line status from the last command.
    notice: Option<String>,
    /// Whether the command help is shown.
    show_help: bool,
    /// Last screen printed, to skip identical redraws.
    last_frame: String,
}

impl HoneySentinel {
    fn new(session: Session, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            session,
            tx,
            notice: None,
            show_help: false,
            last_frame: String::new(),
        }
    }

    /// Loads the first page of messages.
    async fn open(&mut self) {
        let api = self.session.config().api_base.to_string();
        self.notice = if self.session.open().await {
            None
        } else {
            Some(format!("Backend at {api} is not reachable"))
        };
    }

    /// Event loop: prompt input, background results and periodic redraws.
    async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<Message>) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        redraw.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read input")? else {
                        info!("Input closed");
                        return Ok(());
                    };
                    if !self.handle_line(&line).await {
                        return Ok(());
                    }
                    // Always reprint after input so the prompt comes back.
                    self.last_frame.clear();
                }
                Some(message) = rx.recv() => self.update(message).await,
                _ = redraw.tick() => {}
            }
            self.draw()?;
        }
    }

    /// Handles one line of prompt input. Returns `false` when the user quits.
    async fn handle_line(&mut self, line: &str) -> bool {
        // A notice only describes the command that produced it.
        self.notice = None;
        match Message::parse(line) {
            Ok(Message::Quit) => return false,
            Ok(message) => self.update(message).await,
            Err(e) => self.notice = Some(e),
        }
        true
    }

    async fn update(&mut self, message: Message) {
        match message {
            Message::Next => {
                if !self.session.controller_mut().next() {
                    self.notice = Some("Already at the last message".into());
                }
            }
            Message::Prev => {
                if !self.session.controller_mut().prev() {
                    self.notice = Some("Already at the first message".into());
                }
            }
            Message::Select(position) => {
                self.session.controller_mut().select(position - 1);
            }
            Message::Refresh { hard } => {
                let ok = self.session.controller_mut().refresh(hard).await;
                self.notice = Some(if ok {
                    let count = self.session.controller().collection().len();
                    format!("Loaded {count} messages")
                } else {
                    "Refresh failed, showing previous messages".into()
                });
            }
            Message::CheckAuthenticity => {
                if !self.session.controller_mut().retry() {
                    self.notice = Some("Verdict is already ready or being checked".into());
                }
            }
            Message::LookupDomain => self.lookup_domain(),
            Message::DomainChecked(result) => {
                self.notice = Some(match result {
                    Ok(check) => format!("{}: {} ({})", check.email, check.status, check.domain),
                    Err(e) => format!("Domain lookup failed: {e}"),
                });
            }
            Message::Feedback { link, label } => self.send_feedback(link, label),
            Message::FeedbackSent(result) => {
                self.notice = Some(match result {
                    Ok(url) => format!("Thanks, feedback for {url} sent"),
                    Err(e) => format!("Feedback failed: {e}"),
                });
            }
            Message::ToggleHelp => self.show_help = !self.show_help,
            Message::Quit => {}
        }
    }

    fn lookup_domain(&mut self) {
        let Some(view) = self.session.controller().current() else {
            return;
        };
        let email = view.message.metadata.sender_address();
        let client = self.session.client();
        let tx = self.tx.clone();
        self.notice = Some(format!("Looking up {email}..."));

        tokio::spawn(async move {
            let result = client.check_domain(&email).await.map_err(|e| e.to_string());
            // The receiver is gone only during shutdown.
            let _ = tx.send(Message::DomainChecked(result));
        });
    }

    fn send_feedback(&mut self, link: usize, label: FeedbackLabel) {
        let Some(view) = self.session.controller().current() else {
            return;
        };
        let Some(url) = view.message.links.get(link - 1).map(|l| l.url.clone()) else {
            self.notice = Some(format!("This message has no link {link}"));
            return;
        };
        let client = self.session.client();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = client
                .send_feedback(&url, label)
                .await
                .map(|()| url)
                .map_err(|e| e.to_string());
            let _ = tx.send(Message::FeedbackSent(result));
        });
    }

    /// Prints the screen if it changed since the last draw.
    fn draw(&mut self) -> anyhow::Result<()> {
        let controller = self.session.controller();
        let screen = Screen {
            current: controller.current(),
            connection: self.session.connection_state(),
            counts: controller.store().counts(),
            load_error: controller.collection().error().map(ToString::to_string),
            notice: self.notice.as_deref(),
            help: self.show_help.then_some(HELP),
        };
        let frame = view::render(&screen)?;
        if frame == self.last_frame {
            return Ok(());
        }

        let mut stdout = std::io::stdout().lock();
        // Clear the terminal and home the cursor.
        write!(stdout, "\x1B[2J\x1B[H{frame}")?;
        stdout.flush()?;
        self.last_frame = frame;
        Ok(())
    }
}
