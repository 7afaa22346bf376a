//! Analyzed message models.

use std::hash::{DefaultHasher, Hash, Hasher};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Parses a "from" field into name and email parts.
fn parse_from_field(from: &str) -> (String, String) {
    // "Name <email@example.com>"
    if let Some(start) = from.rfind('<')
        && let Some(end) = from.rfind('>')
        && start < end
    {
        let email = from[start + 1..end].trim().to_string();
        let name = from[..start].trim().trim_matches('"').trim().to_string();
        if name.is_empty() {
            return (email.clone(), email);
        }
        return (name, email);
    }
    let bare = from.trim().to_string();
    (bare.clone(), bare)
}

/// Header metadata of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageMetadata {
    /// Sender, usually `Name <address>`.
    pub from: String,
    /// Recipients.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Date header as sent by the provider.
    pub date: String,
}

impl MessageMetadata {
    /// Sender display name.
    #[must_use]
    pub fn sender_name(&self) -> String {
        parse_from_field(&self.from).0
    }

    /// Sender email address.
    #[must_use]
    pub fn sender_address(&self) -> String {
        parse_from_field(&self.from).1
    }
}

/// Message body. A message carries either HTML or plain text, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Rendered HTML.
    Html(String),
    /// Plain text.
    Text(String),
}

impl Body {
    /// Raw body content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Html(s) | Self::Text(s) => s,
        }
    }

    /// Whether the body is HTML.
    #[must_use]
    pub const fn is_html(&self) -> bool {
        matches!(self, Self::Html(_))
    }
}

/// Reputation scan result for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// No threats found.
    Safe,
    /// Threats found.
    Unsafe,
    /// Scanner failed.
    Error,
    /// Not scanned, or status not recognized.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ScanStatus {
    /// Convert to wire string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
            Self::Error => "error",
        }
    }
}

/// A hyperlink found in a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Target URL as it appears in the message.
    pub url: String,
    /// Target domain.
    pub domain: String,
    /// Whether the link points at a host.
    pub is_external: bool,
    /// Latest scan status.
    pub scan_status: ScanStatus,
    /// Threat types or scanner messages, in the order reported.
    pub scan_details: Vec<String>,
}

impl Link {
    /// Builds an unscanned link from a raw href.
    ///
    /// Only `http`, `https` and `mailto` targets are kept. For `mailto`
    /// links the domain is taken from the address.
    #[must_use]
    pub fn from_href(href: &str) -> Option<Self> {
        let parsed = Url::parse(href).ok()?;
        let domain = match parsed.scheme() {
            "http" | "https" => parsed.host_str().unwrap_or_default().to_string(),
            "mailto" => parsed
                .path()
                .rsplit_once('@')
                .map(|(_, domain)| domain.to_lowercase())
                .unwrap_or_default(),
            _ => return None,
        };

        Some(Self {
            url: href.to_string(),
            domain,
            is_external: parsed.host().is_some(),
            scan_status: ScanStatus::Unknown,
            scan_details: Vec::new(),
        })
    }
}

/// A message attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Decoded content.
    pub payload: Bytes,
}

/// An analyzed email message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireMessage")]
pub struct Message {
    /// Provider-assigned identifier, unique within a collection.
    ///
    /// Payloads without an id get one derived from their headers and body,
    /// prefixed with `legacy-`.
    pub id: String,
    /// Header metadata.
    pub metadata: MessageMetadata,
    /// Body content.
    pub body: Body,
    /// Links found in the body.
    pub links: Vec<Link>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Number of links the scanner flagged as unsafe.
    #[must_use]
    pub fn unsafe_link_count(&self) -> usize {
        self.links
            .iter()
            .filter(|l| l.scan_status == ScanStatus::Unsafe)
            .count()
    }
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default, alias = "message_id")]
    id: Option<String>,
    metadata: Option<MessageMetadata>,
    // Older backends send headers at the top level.
    #[serde(flatten)]
    flat: MessageMetadata,
    #[serde(alias = "html")]
    body_html: Option<String>,
    #[serde(alias = "text")]
    body_text: Option<String>,
    #[serde(default)]
    links: Vec<WireLink>,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
}

#[derive(Deserialize)]
struct WireLink {
    url: String,
    domain: Option<String>,
    is_external: Option<bool>,
    #[serde(default, alias = "status")]
    scan_status: ScanStatus,
    #[serde(default, alias = "details")]
    scan_details: Vec<String>,
}

#[derive(Deserialize)]
struct WireAttachment {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default, alias = "data")]
    data_base64: String,
    size: Option<u64>,
}

/// Decodes an attachment payload.
///
/// Gmail hands out URL-safe base64 with optional padding; the standard
/// alphabet is accepted as well.
fn decode_payload(encoded: &str) -> Result<Bytes, base64::DecodeError> {
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect();
    URL_SAFE_NO_PAD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
        .map(Bytes::from)
}

impl WireLink {
    fn into_link(self) -> Option<Link> {
        let mut link = match self.domain {
            Some(domain) => Link {
                is_external: !domain.is_empty(),
                url: self.url,
                domain,
                scan_status: ScanStatus::Unknown,
                scan_details: Vec::new(),
            },
            None => Link::from_href(&self.url)?,
        };
        if let Some(is_external) = self.is_external {
            link.is_external = is_external;
        }
        link.scan_status = self.scan_status;
        link.scan_details = self.scan_details;
        Some(link)
    }
}

impl WireAttachment {
    fn into_attachment(self) -> Option<Attachment> {
        let payload = match decode_payload(&self.data_base64) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping attachment {:?}: {}", self.filename, e);
                return None;
            }
        };
        Some(Attachment {
            size_bytes: self.size.unwrap_or(payload.len() as u64),
            filename: self.filename,
            mime_type: self.mime_type,
            payload,
        })
    }
}

/// Derives a stable id for a message the backend sent without one.
fn derived_id(metadata: &MessageMetadata, body: &Body) -> String {
    let mut hasher = DefaultHasher::new();
    metadata.hash(&mut hasher);
    body.as_str().hash(&mut hasher);
    format!("legacy-{:016x}", hasher.finish())
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let body = match (wire.body_html, wire.body_text) {
            (Some(html), _) if !html.is_empty() => Body::Html(html),
            (_, Some(text)) => Body::Text(text),
            _ => Body::Text(String::new()),
        };
        let metadata = wire.metadata.unwrap_or(wire.flat);
        let id = match wire.id {
            Some(id) if !id.is_empty() => id,
            _ => derived_id(&metadata, &body),
        };

        Self {
            id,
            metadata,
            body,
            links: wire
                .links
                .into_iter()
                .filter_map(WireLink::into_link)
                .collect(),
            attachments: wire
                .attachments
                .into_iter()
                .filter_map(WireAttachment::into_attachment)
                .collect(),
        }
    }
}
