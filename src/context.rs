//! Shared crawl context (§9 design note: no implicit singletons besides `tracing`).
//!
//! One `CrawlContext` is built once in `main` and handed by reference/`Arc` to the
//! scheduler, every tab, and the background helpers (redirect fetcher, seed
//! collector). It owns every piece of state that would otherwise be a global.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::ResolvedConfig;
use crate::progress::ProgressStats;
use crate::store::{Frontier, RequestStore, VisitedSet};

pub struct CrawlContext {
    pub config: ResolvedConfig,
    pub store: RequestStore,
    pub frontier: Frontier,
    pub visited: VisitedSet,
    pub http_client: ureq::Agent,
    pub cancel: CancellationToken,
    pub progress: Arc<ProgressStats>,
}

impl CrawlContext {
    #[must_use]
    pub fn new(entrance: impl Into<String>, config: ResolvedConfig) -> Self {
        let capacity = config.tab_concurrency * 50;

        let http_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .max_redirects(0)
            .build();

        Self {
            store: RequestStore::new(entrance, config.max_requests),
            frontier: Frontier::new(capacity),
            visited: VisitedSet::new(),
            http_client: ureq::Agent::new_with_config(http_config),
            cancel: CancellationToken::new(),
            progress: Arc::new(ProgressStats::new()),
            config,
        }
    }

    /// Headers every navigation/XHR request carries: at minimum User-Agent and, if
    /// configured, a normalized Cookie header.
    #[must_use]
    pub fn base_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), self.config.ua.clone());
        if let Some(cookie) = &self.config.cookie_header {
            headers.insert("Cookie".to_string(), cookie.clone());
        }
        headers
    }
}
