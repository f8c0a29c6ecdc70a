//! Scanner subsystem seams and the built-in probe scanners.
//!
//! Two independently implemented scanners cover the same target-site table
//! so offer freshness survives either one breaking. `DailySweepScanner`
//! issues GET requests; `ProxySweepScanner` issues paced HEAD requests on a
//! separate client, giving the pair non-identical failure modes. Neither
//! parses offer details out of pages; a probe only establishes that a site
//! is reachable and refreshes its recorded offers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    error::{OfferError, Result},
    store::OfferStore,
    types::{ScanSummary, TargetSite, ValidationSummary},
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const PROXY_PACING: Duration = Duration::from_millis(500);

#[async_trait]
pub trait OfferScanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time readiness check, invoked by the bootstrap orchestrator
    /// before the first scan.
    async fn start(&self) -> Result<()>;

    /// One pass over every known target site.
    async fn scan_all(&self) -> Result<ScanSummary>;
}

#[async_trait]
pub trait NewMemberValidator: Send + Sync {
    /// Audits previously recorded new-member offers for staleness without
    /// touching the network.
    async fn validate_existing(&self) -> Result<ValidationSummary>;

    /// Re-probes the sites behind recorded new-member offers and stamps the
    /// ones that still answer.
    async fn refresh(&self) -> Result<ValidationSummary>;
}

fn probe_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .user_agent(concat!("offerwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(OfferError::from)
}

/// Primary scanner: plain GET probe per site.
pub struct DailySweepScanner {
    client: reqwest::Client,
    sites: Vec<TargetSite>,
    store: Arc<dyn OfferStore>,
}

impl std::fmt::Debug for DailySweepScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailySweepScanner")
            .field("sites", &self.sites.len())
            .finish_non_exhaustive()
    }
}

impl DailySweepScanner {
    pub fn new(
        sites: Vec<TargetSite>,
        store: Arc<dyn OfferStore>,
    ) -> Result<Self> {
        Ok(Self {
            client: probe_client()?,
            sites,
            store,
        })
    }

    async fn probe(&self, site: &TargetSite) -> Result<usize> {
        let response = self.client.get(&site.url).send().await?;
        response.error_for_status()?;
        self.store.refresh_site(site, Utc::now()).await
    }
}

#[async_trait]
impl OfferScanner for DailySweepScanner {
    fn name(&self) -> &'static str {
        "daily-sweep"
    }

    async fn start(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(OfferError::Internal(
                "no target sites configured".into(),
            ));
        }
        info!(
            target: "scan",
            scanner = self.name(),
            sites = self.sites.len(),
            "scanner ready"
        );
        Ok(())
    }

    async fn scan_all(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        for site in &self.sites {
            match self.probe(site).await {
                Ok(refreshed) => {
                    summary.sites_scanned += 1;
                    summary.offers_refreshed += refreshed;
                }
                Err(err) => {
                    summary.sites_failed += 1;
                    warn!(
                        target: "scan",
                        scanner = self.name(),
                        site = %site.name,
                        error = %err,
                        "site probe failed"
                    );
                }
            }
        }
        info!(
            target: "scan",
            scanner = self.name(),
            scanned = summary.sites_scanned,
            failed = summary.sites_failed,
            refreshed = summary.offers_refreshed,
            "full scan finished"
        );
        Ok(summary)
    }
}

/// Redundant scanner: paced HEAD probes on its own client. Kept
/// intentionally different from [`DailySweepScanner`] so the two do not
/// share failure modes.
pub struct ProxySweepScanner {
    client: reqwest::Client,
    sites: Vec<TargetSite>,
    store: Arc<dyn OfferStore>,
    pacing: Duration,
}

impl std::fmt::Debug for ProxySweepScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySweepScanner")
            .field("sites", &self.sites.len())
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl ProxySweepScanner {
    pub fn new(
        sites: Vec<TargetSite>,
        store: Arc<dyn OfferStore>,
    ) -> Result<Self> {
        Ok(Self {
            client: probe_client()?,
            sites,
            store,
            pacing: PROXY_PACING,
        })
    }

    async fn probe(&self, site: &TargetSite) -> Result<usize> {
        let response = self.client.head(&site.url).send().await?;
        response.error_for_status()?;
        self.store.refresh_site(site, Utc::now()).await
    }
}

#[async_trait]
impl OfferScanner for ProxySweepScanner {
    fn name(&self) -> &'static str {
        "proxy-sweep"
    }

    async fn start(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(OfferError::Internal(
                "no target sites configured".into(),
            ));
        }
        info!(
            target: "scan",
            scanner = self.name(),
            sites = self.sites.len(),
            "scanner ready"
        );
        Ok(())
    }

    async fn scan_all(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        for (idx, site) in self.sites.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            match self.probe(site).await {
                Ok(refreshed) => {
                    summary.sites_scanned += 1;
                    summary.offers_refreshed += refreshed;
                }
                Err(err) => {
                    summary.sites_failed += 1;
                    warn!(
                        target: "scan",
                        scanner = self.name(),
                        site = %site.name,
                        error = %err,
                        "site probe failed"
                    );
                }
            }
        }
        info!(
            target: "scan",
            scanner = self.name(),
            scanned = summary.sites_scanned,
            failed = summary.sites_failed,
            refreshed = summary.offers_refreshed,
            "full scan finished"
        );
        Ok(summary)
    }
}

/// Audits recorded new-member offers and re-stamps the ones whose site
/// still answers a probe.
pub struct NewMemberAuditor {
    client: reqwest::Client,
    sites: Vec<TargetSite>,
    store: Arc<dyn OfferStore>,
    max_age: chrono::Duration,
}

impl std::fmt::Debug for NewMemberAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewMemberAuditor")
            .field("sites", &self.sites.len())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl NewMemberAuditor {
    pub fn new(
        sites: Vec<TargetSite>,
        store: Arc<dyn OfferStore>,
        max_age: chrono::Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: probe_client()?,
            sites,
            store,
            max_age,
        })
    }

    fn site_url(&self, name: &str) -> Result<&str> {
        self.sites
            .iter()
            .find(|site| site.name == name)
            .map(|site| site.url.as_str())
            .ok_or_else(|| OfferError::SiteNotFound(name.to_string()))
    }
}

#[async_trait]
impl NewMemberValidator for NewMemberAuditor {
    async fn validate_existing(&self) -> Result<ValidationSummary> {
        let now = Utc::now();
        let mut summary = ValidationSummary::default();
        for offer in self.store.new_member_offers().await? {
            summary.checked += 1;
            if offer.is_stale(now, self.max_age) {
                summary.stale += 1;
                warn!(
                    target: "scan",
                    site = %offer.site,
                    last_validated = ?offer.last_validated,
                    "new-member offer is stale"
                );
            }
        }
        info!(
            target: "scan",
            checked = summary.checked,
            stale = summary.stale,
            "new-member offer audit finished"
        );
        Ok(summary)
    }

    async fn refresh(&self) -> Result<ValidationSummary> {
        let mut summary = ValidationSummary::default();
        for offer in self.store.new_member_offers().await? {
            summary.checked += 1;
            let url = match self.site_url(&offer.site) {
                Ok(url) => url,
                Err(err) => {
                    summary.stale += 1;
                    warn!(
                        target: "scan",
                        site = %offer.site,
                        error = %err,
                        "cannot refresh offer for unknown site"
                    );
                    continue;
                }
            };
            let probed = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            match probed {
                Ok(_) => {
                    self.store.mark_validated(&offer.site, Utc::now()).await?;
                    summary.refreshed += 1;
                }
                Err(err) => {
                    summary.stale += 1;
                    warn!(
                        target: "scan",
                        site = %offer.site,
                        error = %err,
                        "new-member offer refresh probe failed"
                    );
                }
            }
        }
        info!(
            target: "scan",
            checked = summary.checked,
            refreshed = summary.refreshed,
            stale = summary.stale,
            "new-member offer refresh finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryOfferStore, types::Offer};

    #[tokio::test]
    async fn scanners_refuse_to_start_without_sites() {
        let store: Arc<dyn OfferStore> = Arc::new(MemoryOfferStore::new());
        let daily =
            DailySweepScanner::new(Vec::new(), Arc::clone(&store)).unwrap();
        assert!(daily.start().await.is_err());

        let proxy = ProxySweepScanner::new(Vec::new(), store).unwrap();
        assert!(proxy.start().await.is_err());
    }

    #[tokio::test]
    async fn audit_counts_stale_and_fresh_offers() {
        let store = Arc::new(MemoryOfferStore::new());
        let mut fresh = Offer::new_member("acme", "welcome bonus", None);
        fresh.last_validated = Some(Utc::now());
        store.upsert_offer(fresh).await.unwrap();
        store
            .upsert_offer(Offer::new_member("globex", "intro rate", None))
            .await
            .unwrap();

        let auditor = NewMemberAuditor::new(
            vec![
                TargetSite::new("acme", "https://acme.example"),
                TargetSite::new("globex", "https://globex.example"),
            ],
            store,
            chrono::Duration::hours(24),
        )
        .unwrap();

        let summary = auditor.validate_existing().await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.stale, 1);
    }
}
