use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One of the fixed external sites the service harvests offers from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSite {
    pub name: String,
    pub url: String,
}

impl TargetSite {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// Baseline offer guaranteed to exist for every known target site.
    Standard,
    /// First-time-user offer; eligibility rules change, so these are
    /// re-validated periodically.
    NewMember,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferKind::Standard => "standard",
            OfferKind::NewMember => "new_member",
        }
    }
}

/// A promotional reward recorded for a target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub site: String,
    pub kind: OfferKind,
    pub headline: String,
    pub reward: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_validated: Option<DateTime<Utc>>,
}

impl Offer {
    /// Baseline offer for a site, stamped with the current time.
    pub fn standard(site: impl Into<String>) -> Self {
        let site = site.into();
        let now = Utc::now();
        Self {
            headline: format!("Standard rewards at {site}"),
            site,
            kind: OfferKind::Standard,
            reward: None,
            first_seen: now,
            last_seen: now,
            last_validated: None,
        }
    }

    pub fn new_member(
        site: impl Into<String>,
        headline: impl Into<String>,
        reward: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            site: site.into(),
            kind: OfferKind::NewMember,
            headline: headline.into(),
            reward,
            first_seen: now,
            last_seen: now,
            last_validated: None,
        }
    }

    /// Whether the offer has gone unvalidated for longer than `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_validated {
            Some(validated) => now - validated > max_age,
            None => true,
        }
    }
}

/// Outcome of one full scan pass over the target-site table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub sites_scanned: usize,
    pub sites_failed: usize,
    pub offers_refreshed: usize,
}

/// Outcome of a new-member offer validation or refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub checked: usize,
    pub stale: usize,
    pub refreshed: usize,
}

/// Outcome of standard-offer seeding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub created: usize,
    pub existing: usize,
}
