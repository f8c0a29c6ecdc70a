//! Post-bind startup sequence for the background scanning subsystems.
//!
//! The orchestrator runs strictly after the listener is bound and the
//! bind-success line is logged, and it never gates request serving: `main`
//! spawns it onto the runtime and keeps serving. Every step is its own
//! failure domain; a step that fails is reported and the next one still
//! runs. `start` itself cannot fail.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use offerwatch_core::{
    scan::{NewMemberValidator, OfferScanner},
    store::OfferStore,
    types::TargetSite,
};

use crate::infra::jobs::{JobError, JobRegistry, ScheduledJob, job_fn};

/// Job identity of the primary full-scan cycle (Scanner A).
pub const DAILY_SCAN_JOB: &str = "daily-scan";
/// Job identity of the redundant full-scan cycle (Scanner B).
pub const PROXY_SCAN_JOB: &str = "proxy-scan";
/// Job identity of the recurring new-member offer refresh.
pub const NEW_MEMBER_REFRESH_JOB: &str = "new-member-refresh";

pub struct Bootstrap {
    registry: Arc<JobRegistry>,
    scanner_a: Arc<dyn OfferScanner>,
    scanner_b: Arc<dyn OfferScanner>,
    validator: Arc<dyn NewMemberValidator>,
    store: Arc<dyn OfferStore>,
    sites: Vec<TargetSite>,
    scan_interval: Duration,
    refresh_interval: Duration,
    job_timeout: Duration,
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("sites", &self.sites.len())
            .field("scan_interval", &self.scan_interval)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<JobRegistry>,
        scanner_a: Arc<dyn OfferScanner>,
        scanner_b: Arc<dyn OfferScanner>,
        validator: Arc<dyn NewMemberValidator>,
        store: Arc<dyn OfferStore>,
        sites: Vec<TargetSite>,
        scan_interval: Duration,
        refresh_interval: Duration,
        job_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            scanner_a,
            scanner_b,
            validator,
            store,
            sites,
            scan_interval,
            refresh_interval,
            job_timeout,
        }
    }

    /// Registers the three recurring jobs: one scan cycle per scanner
    /// subsystem plus the new-member refresh. A duplicate name is a
    /// programming error and aborts startup.
    pub fn register_jobs(&self) -> Result<(), JobError> {
        let scanner = Arc::clone(&self.scanner_a);
        self.registry.register(
            DAILY_SCAN_JOB,
            self.scan_interval,
            self.job_timeout,
            job_fn(move || {
                let scanner = Arc::clone(&scanner);
                async move {
                    scanner.scan_all().await?;
                    Ok(())
                }
            }),
        )?;

        let scanner = Arc::clone(&self.scanner_b);
        self.registry.register(
            PROXY_SCAN_JOB,
            self.scan_interval,
            self.job_timeout,
            job_fn(move || {
                let scanner = Arc::clone(&scanner);
                async move {
                    scanner.scan_all().await?;
                    Ok(())
                }
            }),
        )?;

        let validator = Arc::clone(&self.validator);
        self.registry.register(
            NEW_MEMBER_REFRESH_JOB,
            self.refresh_interval,
            self.job_timeout,
            job_fn(move || {
                let validator = Arc::clone(&validator);
                async move {
                    validator.refresh().await?;
                    Ok(())
                }
            }),
        )?;

        Ok(())
    }

    /// Runs the startup sequence, in order:
    ///
    /// 1. start Scanner A and Scanner B (both attempted unconditionally)
    /// 2. one immediate full scan, so data exists before the first cycle
    /// 3. audit previously recorded new-member offers
    /// 4. seed a standard offer for every known target site (idempotent)
    /// 5. schedule the recurring jobs; the first firing of each lands one
    ///    full interval from now, not immediately
    ///
    /// Returns the cancellation handles of the scheduled jobs.
    pub async fn start(&self) -> Vec<ScheduledJob> {
        if let Err(err) = self.scanner_a.start().await {
            error!(
                target: "bootstrap",
                scanner = self.scanner_a.name(),
                error = %err,
                "primary scanner failed to start"
            );
        }
        if let Err(err) = self.scanner_b.start().await {
            error!(
                target: "bootstrap",
                scanner = self.scanner_b.name(),
                error = %err,
                "redundant scanner failed to start"
            );
        }

        if let Err(err) = self.registry.run_once(DAILY_SCAN_JOB).await {
            error!(target: "bootstrap", error = %err, "initial full scan failed");
        }

        match self.validator.validate_existing().await {
            Ok(summary) => info!(
                target: "bootstrap",
                checked = summary.checked,
                stale = summary.stale,
                "validated recorded new-member offers"
            ),
            Err(err) => {
                error!(target: "bootstrap", error = %err, "new-member offer validation failed")
            }
        }

        match self.store.seed_standard_offers(&self.sites).await {
            Ok(summary) => info!(
                target: "bootstrap",
                created = summary.created,
                existing = summary.existing,
                "standard offers seeded"
            ),
            Err(err) => {
                error!(target: "bootstrap", error = %err, "standard offer seeding failed")
            }
        }

        let mut handles = Vec::new();
        for name in [DAILY_SCAN_JOB, PROXY_SCAN_JOB, NEW_MEMBER_REFRESH_JOB] {
            match self.registry.schedule(name) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    error!(target: "bootstrap", job = name, error = %err, "failed to schedule job")
                }
            }
        }

        info!(
            target: "bootstrap",
            scheduled = handles.len(),
            "background startup complete"
        );
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use offerwatch_core::{
        OfferError, Result as CoreResult,
        types::{Offer, ScanSummary, SeedSummary, ValidationSummary},
    };
    use std::sync::Mutex as StdMutex;

    type EventLog = Arc<StdMutex<Vec<&'static str>>>;

    struct FakeScanner {
        name: &'static str,
        start_event: &'static str,
        scan_event: &'static str,
        events: EventLog,
        fail: bool,
    }

    #[async_trait]
    impl OfferScanner for FakeScanner {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn start(&self) -> CoreResult<()> {
            self.events.lock().unwrap().push(self.start_event);
            if self.fail {
                return Err(OfferError::Internal("start broken".into()));
            }
            Ok(())
        }

        async fn scan_all(&self) -> CoreResult<ScanSummary> {
            self.events.lock().unwrap().push(self.scan_event);
            if self.fail {
                return Err(OfferError::Internal("scan broken".into()));
            }
            Ok(ScanSummary::default())
        }
    }

    struct FakeValidator {
        events: EventLog,
        fail: bool,
    }

    #[async_trait]
    impl NewMemberValidator for FakeValidator {
        async fn validate_existing(&self) -> CoreResult<ValidationSummary> {
            self.events.lock().unwrap().push("validate");
            if self.fail {
                return Err(OfferError::Internal("validate broken".into()));
            }
            Ok(ValidationSummary::default())
        }

        async fn refresh(&self) -> CoreResult<ValidationSummary> {
            self.events.lock().unwrap().push("refresh");
            Ok(ValidationSummary::default())
        }
    }

    struct FakeStore {
        events: EventLog,
        fail: bool,
    }

    #[async_trait]
    impl OfferStore for FakeStore {
        async fn list_offers(&self) -> CoreResult<Vec<Offer>> {
            Ok(Vec::new())
        }

        async fn offers_for_site(&self, _site: &str) -> CoreResult<Vec<Offer>> {
            Ok(Vec::new())
        }

        async fn upsert_offer(&self, _offer: Offer) -> CoreResult<()> {
            Ok(())
        }

        async fn refresh_site(
            &self,
            _site: &TargetSite,
            _seen_at: DateTime<Utc>,
        ) -> CoreResult<usize> {
            Ok(0)
        }

        async fn new_member_offers(&self) -> CoreResult<Vec<Offer>> {
            Ok(Vec::new())
        }

        async fn mark_validated(
            &self,
            _site: &str,
            _validated_at: DateTime<Utc>,
        ) -> CoreResult<()> {
            Ok(())
        }

        async fn seed_standard_offers(
            &self,
            _sites: &[TargetSite],
        ) -> CoreResult<SeedSummary> {
            self.events.lock().unwrap().push("seed");
            if self.fail {
                return Err(OfferError::Store("seed broken".into()));
            }
            Ok(SeedSummary::default())
        }
    }

    const TICK: Duration = Duration::from_secs(24 * 60 * 60);

    fn bootstrap_with(events: EventLog, fail_everything: bool) -> Bootstrap {
        Bootstrap::new(
            Arc::new(JobRegistry::new()),
            Arc::new(FakeScanner {
                name: "daily-sweep",
                start_event: "a.start",
                scan_event: "a.scan",
                events: Arc::clone(&events),
                fail: fail_everything,
            }),
            Arc::new(FakeScanner {
                name: "proxy-sweep",
                start_event: "b.start",
                scan_event: "b.scan",
                events: Arc::clone(&events),
                fail: fail_everything,
            }),
            Arc::new(FakeValidator {
                events: Arc::clone(&events),
                fail: fail_everything,
            }),
            Arc::new(FakeStore {
                events,
                fail: fail_everything,
            }),
            vec![TargetSite::new("acme", "https://acme.example")],
            TICK,
            TICK,
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn startup_steps_run_once_each_in_order() {
        let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let bootstrap = bootstrap_with(Arc::clone(&events), false);
        bootstrap.register_jobs().unwrap();

        let _handles = bootstrap.start().await;

        assert_eq!(
            *events.lock().unwrap(),
            vec!["a.start", "b.start", "a.scan", "validate", "seed"]
        );
    }

    #[tokio::test]
    async fn every_step_is_attempted_even_when_all_of_them_fail() {
        let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let bootstrap = bootstrap_with(Arc::clone(&events), true);
        bootstrap.register_jobs().unwrap();

        let handles = bootstrap.start().await;

        assert_eq!(
            *events.lock().unwrap(),
            vec!["a.start", "b.start", "a.scan", "validate", "seed"]
        );
        // Scheduling still happens after upstream failures.
        assert_eq!(handles.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_fires_one_day_out_and_not_at_startup() {
        let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let bootstrap = bootstrap_with(Arc::clone(&events), false);
        bootstrap.register_jobs().unwrap();
        let _handles = bootstrap.start().await;

        let refreshes = |events: &EventLog| {
            events
                .lock()
                .unwrap()
                .iter()
                .filter(|event| **event == "refresh")
                .count()
        };

        assert_eq!(refreshes(&events), 0, "no refresh at t+0");

        tokio::time::sleep(TICK - Duration::from_secs(1)).await;
        assert_eq!(refreshes(&events), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(refreshes(&events), 1);

        tokio::time::sleep(TICK).await;
        assert_eq!(refreshes(&events), 2);
    }

    #[tokio::test]
    async fn duplicate_job_registration_fails_fast() {
        let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let bootstrap = bootstrap_with(events, false);
        bootstrap.register_jobs().unwrap();
        assert!(matches!(
            bootstrap.register_jobs(),
            Err(JobError::Duplicate(_))
        ));
    }
}
