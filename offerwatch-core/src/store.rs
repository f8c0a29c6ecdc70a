//! Offer store port plus the in-memory implementation.
//!
//! The store is shared between both scanner subsystems, the new-member
//! validator, and the read API, so every implementation must tolerate
//! concurrent writers. Callers must not assume read-after-write consistency
//! across separately issued calls.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::Result,
    types::{Offer, OfferKind, SeedSummary, TargetSite},
};

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn list_offers(&self) -> Result<Vec<Offer>>;

    async fn offers_for_site(&self, site: &str) -> Result<Vec<Offer>>;

    async fn upsert_offer(&self, offer: Offer) -> Result<()>;

    /// Marks every offer recorded for `site` as seen at `seen_at`. If the
    /// site has no offers yet a standard offer is inserted so a successful
    /// scan always leaves the site represented. Returns the number of offers
    /// refreshed.
    async fn refresh_site(
        &self,
        site: &TargetSite,
        seen_at: DateTime<Utc>,
    ) -> Result<usize>;

    async fn new_member_offers(&self) -> Result<Vec<Offer>>;

    /// Stamps the new-member offer for `site` as validated at `validated_at`.
    async fn mark_validated(
        &self,
        site: &str,
        validated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Ensures a standard offer exists for every known target site.
    /// Idempotent: re-running never creates duplicates.
    async fn seed_standard_offers(
        &self,
        sites: &[TargetSite],
    ) -> Result<SeedSummary>;
}

/// In-memory store keyed by (site, kind). One offer per kind per site.
#[derive(Debug, Default)]
pub struct MemoryOfferStore {
    offers: RwLock<HashMap<(String, OfferKind), Offer>>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for MemoryOfferStore {
    async fn list_offers(&self) -> Result<Vec<Offer>> {
        let guard = self.offers.read().await;
        let mut offers: Vec<Offer> = guard.values().cloned().collect();
        offers.sort_by(|a, b| {
            a.site.cmp(&b.site).then(a.kind.as_str().cmp(b.kind.as_str()))
        });
        Ok(offers)
    }

    async fn offers_for_site(&self, site: &str) -> Result<Vec<Offer>> {
        let guard = self.offers.read().await;
        let mut offers: Vec<Offer> = guard
            .values()
            .filter(|offer| offer.site == site)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));
        Ok(offers)
    }

    async fn upsert_offer(&self, offer: Offer) -> Result<()> {
        let mut guard = self.offers.write().await;
        guard.insert((offer.site.clone(), offer.kind), offer);
        Ok(())
    }

    async fn refresh_site(
        &self,
        site: &TargetSite,
        seen_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut guard = self.offers.write().await;
        let mut refreshed = 0;
        for offer in guard.values_mut().filter(|o| o.site == site.name) {
            offer.last_seen = seen_at;
            refreshed += 1;
        }
        if refreshed == 0 {
            let mut offer = Offer::standard(site.name.clone());
            offer.last_seen = seen_at;
            guard.insert((site.name.clone(), OfferKind::Standard), offer);
            refreshed = 1;
        }
        Ok(refreshed)
    }

    async fn new_member_offers(&self) -> Result<Vec<Offer>> {
        let guard = self.offers.read().await;
        let mut offers: Vec<Offer> = guard
            .values()
            .filter(|offer| offer.kind == OfferKind::NewMember)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.site.cmp(&b.site));
        Ok(offers)
    }

    async fn mark_validated(
        &self,
        site: &str,
        validated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut guard = self.offers.write().await;
        if let Some(offer) =
            guard.get_mut(&(site.to_string(), OfferKind::NewMember))
        {
            offer.last_validated = Some(validated_at);
        }
        Ok(())
    }

    async fn seed_standard_offers(
        &self,
        sites: &[TargetSite],
    ) -> Result<SeedSummary> {
        let mut guard = self.offers.write().await;
        let mut summary = SeedSummary::default();
        for site in sites {
            let key = (site.name.clone(), OfferKind::Standard);
            if guard.contains_key(&key) {
                summary.existing += 1;
            } else {
                guard.insert(key, Offer::standard(site.name.clone()));
                summary.created += 1;
            }
        }
        Ok(summary)
    }
}
