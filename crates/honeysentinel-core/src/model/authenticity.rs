//! Sender authenticity models.
//!
//! A verdict covers four DNS mechanisms (SPF, DKIM, DMARC, MX) plus an
//! overall trust rating. Every record always carries all four mechanisms;
//! missing data is an explicit "not available" entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// DNS mechanism checked for a sender domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// Sender Policy Framework.
    Spf,
    /// `DomainKeys` Identified Mail.
    Dkim,
    /// Domain-based Message Authentication, Reporting and Conformance.
    Dmarc,
    /// Mail exchanger records.
    Mx,
}

impl Mechanism {
    /// All mechanisms, in display order.
    pub const ALL: [Self; 4] = [Self::Spf, Self::Dkim, Self::Dmarc, Self::Mx];

    /// Wire name of the mechanism.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spf => "spf",
            Self::Dkim => "dkim",
            Self::Dmarc => "dmarc",
            Self::Mx => "mx",
        }
    }
}

/// Result of one mechanism check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MechanismResult {
    /// Check status as reported by the backend (e.g. `pass`, `fail`).
    pub status: String,
    /// Raw DNS records, in the order returned.
    #[serde(default)]
    pub records: Vec<String>,
}

impl MechanismResult {
    /// Status used when the backend supplied no data for a mechanism.
    pub const NOT_AVAILABLE: &'static str = "not_available";

    /// Creates a result with the given status and records.
    #[must_use]
    pub fn new(status: impl Into<String>, records: Vec<String>) -> Self {
        Self {
            status: status.into(),
            records,
        }
    }

    /// Explicit placeholder for a mechanism without data.
    #[must_use]
    pub fn not_available() -> Self {
        Self::new(Self::NOT_AVAILABLE, Vec::new())
    }

    /// Whether the backend supplied data for this mechanism.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status != Self::NOT_AVAILABLE
    }
}

/// Per-mechanism results. All four mechanisms are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MechanismResults {
    spf: MechanismResult,
    dkim: MechanismResult,
    dmarc: MechanismResult,
    mx: MechanismResult,
}

impl Default for MechanismResults {
    fn default() -> Self {
        Self {
            spf: MechanismResult::not_available(),
            dkim: MechanismResult::not_available(),
            dmarc: MechanismResult::not_available(),
            mx: MechanismResult::not_available(),
        }
    }
}

impl MechanismResults {
    /// Result for a mechanism.
    #[must_use]
    pub const fn get(&self, mechanism: Mechanism) -> &MechanismResult {
        match mechanism {
            Mechanism::Spf => &self.spf,
            Mechanism::Dkim => &self.dkim,
            Mechanism::Dmarc => &self.dmarc,
            Mechanism::Mx => &self.mx,
        }
    }

    /// Replaces the result for a mechanism.
    pub fn set(&mut self, mechanism: Mechanism, result: MechanismResult) {
        let slot = match mechanism {
            Mechanism::Spf => &mut self.spf,
            Mechanism::Dkim => &mut self.dkim,
            Mechanism::Dmarc => &mut self.dmarc,
            Mechanism::Mx => &mut self.mx,
        };
        *slot = result;
    }

    /// Iterates over all mechanisms with their results.
    pub fn iter(&self) -> impl Iterator<Item = (Mechanism, &MechanismResult)> {
        Mechanism::ALL.into_iter().map(|m| (m, self.get(m)))
    }
}

/// Overall sender trust rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// All mechanisms pass.
    HighlyTrustworthy,
    /// Some mechanisms missing or soft-failing.
    ModeratelyTrustworthy,
    /// Mechanisms fail or the domain looks spoofed.
    Untrustworthy,
    /// Not determined, or a rating this client does not recognize.
    #[default]
    #[serde(other)]
    Unknown,
}

impl OverallStatus {
    /// Convert to wire string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HighlyTrustworthy => "highly_trustworthy",
            Self::ModeratelyTrustworthy => "moderately_trustworthy",
            Self::Untrustworthy => "untrustworthy",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::HighlyTrustworthy => "Highly trustworthy",
            Self::ModeratelyTrustworthy => "Moderately trustworthy",
            Self::Untrustworthy => "Untrustworthy",
            Self::Unknown => "Unknown",
        }
    }
}

/// Sender authenticity verdict for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticityRecord {
    /// Sender domain that was checked.
    pub domain: String,
    /// Whether the sender address is syntactically valid.
    pub email_syntax_valid: bool,
    /// Per-mechanism results.
    pub mechanisms: MechanismResults,
    /// Overall rating.
    pub overall_status: OverallStatus,
    /// When the backend produced the verdict.
    pub last_updated: DateTime<Utc>,
    /// Backend request identifier.
    pub request_id: String,
}

impl AuthenticityRecord {
    /// A record with no data, stamped with the given time.
    #[must_use]
    pub fn empty(last_updated: DateTime<Utc>) -> Self {
        Self {
            domain: String::new(),
            email_syntax_valid: false,
            mechanisms: MechanismResults::default(),
            overall_status: OverallStatus::Unknown,
            last_updated,
            request_id: String::new(),
        }
    }
}

/// Authenticity fields as they appear on the wire.
///
/// Poll responses carry a full set; push updates may carry any subset.
/// Fields left out keep whatever the base record had when the patch is
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthenticityPatch {
    /// Sender domain.
    pub domain: Option<String>,
    /// Sender address syntax check.
    #[serde(alias = "email_syntax_valid")]
    pub email_syntax: Option<bool>,
    /// SPF result.
    pub spf: Option<MechanismResult>,
    /// DKIM result.
    pub dkim: Option<MechanismResult>,
    /// DMARC result.
    pub dmarc: Option<MechanismResult>,
    /// MX result.
    pub mx: Option<MechanismResult>,
    /// Overall rating.
    pub overall_status: Option<OverallStatus>,
    /// Unix seconds.
    pub last_updated: Option<i64>,
    /// Backend request identifier.
    pub request_id: Option<String>,
}

impl AuthenticityPatch {
    /// Whether the patch carries no authenticity fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlays the patch onto a base record.
    #[must_use]
    pub fn apply(self, mut base: AuthenticityRecord) -> AuthenticityRecord {
        if let Some(domain) = self.domain {
            base.domain = domain;
        }
        if let Some(valid) = self.email_syntax {
            base.email_syntax_valid = valid;
        }
        for (mechanism, result) in [
            (Mechanism::Spf, self.spf),
            (Mechanism::Dkim, self.dkim),
            (Mechanism::Dmarc, self.dmarc),
            (Mechanism::Mx, self.mx),
        ] {
            if let Some(result) = result {
                base.mechanisms.set(mechanism, result);
            }
        }
        if let Some(status) = self.overall_status {
            base.overall_status = status;
        }
        if let Some(ts) = self.last_updated.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            base.last_updated = ts;
        }
        if let Some(request_id) = self.request_id {
            base.request_id = request_id;
        }
        base
    }
}

/// Response of the authenticity poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// Backend is still computing the verdict.
    Processing,
    /// Verdict is ready.
    Ready(AuthenticityRecord),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ProcessingMarker {
    Processing,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePoll {
    Processing {
        #[allow(dead_code)]
        status: ProcessingMarker,
    },
    Record(AuthenticityPatch),
}

impl PollResponse {
    /// Decodes a poll response body.
    ///
    /// A terminal response must at least carry `overall_status`. Records
    /// without `last_updated` are stamped with the arrival time.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not JSON, or is neither a processing
    /// marker nor a verdict.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<WirePoll>(body)? {
            WirePoll::Processing { .. } => Ok(Self::Processing),
            WirePoll::Record(patch) if patch.overall_status.is_some() => {
                Ok(Self::Ready(patch.apply(AuthenticityRecord::empty(Utc::now()))))
            }
            WirePoll::Record(_) => Err(<serde_json::Error as serde::de::Error>::custom(
                "authenticity response has neither a processing status nor an overall_status",
            )),
        }
    }
}
