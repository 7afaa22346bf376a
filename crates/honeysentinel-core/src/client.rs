//! HTTP client for the analysis backend.
//!
//! The browsing components depend on the [`MessageSource`] and
//! [`AuthenticitySource`] traits rather than on [`ApiClient`] directly, so
//! they can be driven by in-memory sources in tests.

use std::collections::HashSet;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::model::{Message, PollResponse};
use crate::{Error, Result};

/// Source of bulk message loads.
pub trait MessageSource: Send + Sync + 'static {
    /// Fetches the latest analyzed messages, newest first.
    fn fetch_messages(&self, max_results: u32) -> impl Future<Output = Result<Vec<Message>>> + Send;
}

/// Source of authenticity verdicts.
pub trait AuthenticitySource: Send + Sync + 'static {
    /// Asks the backend for the verdict of one message. The backend starts
    /// computing on first request and answers `processing` until done.
    fn poll_authenticity(&self, id: &str) -> impl Future<Output = Result<PollResponse>> + Send;
}

/// User classification sent to the feedback sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    /// Legitimate link.
    Safe,
    /// Marketing or tracking link.
    Marketing,
    /// Credential phishing.
    Phishing,
    /// Scam or fraud.
    Scam,
}

impl FeedbackLabel {
    /// Parse from user input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "marketing" => Some(Self::Marketing),
            "phishing" => Some(Self::Phishing),
            "scam" => Some(Self::Scam),
            _ => None,
        }
    }
}

/// Domain reputation lookup result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DomainCheck {
    /// Address that was checked.
    pub email: String,
    /// Domain of the address.
    pub domain: String,
    /// Reputation status reported by the backend.
    pub status: String,
    /// Raw WHOIS data, when available.
    #[serde(default)]
    pub whois_info: Option<Value>,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(alias = "emails")]
    gmail_messages: Vec<Value>,
}

/// Decodes a bulk load response.
///
/// Entries are decoded one by one. An entry that does not decode, or that
/// repeats an id already seen on the page, is logged and skipped.
fn decode_page(body: &str) -> Result<Vec<Message>> {
    let list: MessageList = serde_json::from_str(body)?;
    let mut seen = HashSet::new();
    let mut messages = Vec::with_capacity(list.gmail_messages.len());
    for (index, raw) in list.gmail_messages.into_iter().enumerate() {
        match serde_json::from_value::<Message>(raw) {
            Ok(message) if seen.insert(message.id.clone()) => messages.push(message),
            Ok(message) => warn!("Skipping duplicate message {}", message.id),
            Err(e) => warn!("Skipping message {} of the page: {}", index, e),
        }
    }
    Ok(messages)
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    url: &'a str,
    label: FeedbackLabel,
}

/// Client for the analysis backend's REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Creates a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base: config.api_base.clone(),
        })
    }

    /// Base URL of the backend.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Builds an endpoint URL from path segments. Segments are
    /// percent-encoded, so ids and addresses can be passed verbatim.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        debug!("GET {}", url);
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                endpoint: url.path().to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Sends the user's classification of a link. The backend's answer is
    /// not interpreted beyond its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or is rejected.
    pub async fn send_feedback(&self, link_url: &str, label: FeedbackLabel) -> Result<()> {
        let url = self.endpoint(&["feedback"])?;
        let response = self
            .http
            .post(url.clone())
            .json(&FeedbackRequest {
                url: link_url,
                label,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            warn!("Feedback rejected with status {}", response.status());
            return Err(Error::Status {
                status: response.status().as_u16(),
                endpoint: url.path().to_string(),
            });
        }
        Ok(())
    }

    /// Looks up domain reputation for an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn check_domain(&self, email: &str) -> Result<DomainCheck> {
        let body = self.get_text(self.endpoint(&["check-domain", email])?).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl MessageSource for ApiClient {
    async fn fetch_messages(&self, max_results: u32) -> Result<Vec<Message>> {
        let mut url = self.endpoint(&["analyze", "gmail"])?;
        url.query_pairs_mut()
            .append_pair("max_results", &max_results.to_string());
        let body = self.get_text(url).await?;
        decode_page(&body)
    }
}

impl AuthenticitySource for ApiClient {
    async fn poll_authenticity(&self, id: &str) -> Result<PollResponse> {
        let url = self.endpoint(&["analyze", "gmail", id, "authenticity"])?;
        let body = self.get_text(url).await?;
        Ok(PollResponse::from_json(&body)?)
    }
}
