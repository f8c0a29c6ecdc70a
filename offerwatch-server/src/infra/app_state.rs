use std::{fmt, sync::Arc};

use offerwatch_core::store::OfferStore;

use crate::infra::{config::Config, jobs::JobRegistry};

/// Shared handle threaded through every request handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn OfferStore>,
    registry: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn OfferStore>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                registry,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn OfferStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.inner.registry
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("port", &self.inner.config.server_port)
            .field("sites", &self.inner.config.sites.len())
            .finish_non_exhaustive()
    }
}
