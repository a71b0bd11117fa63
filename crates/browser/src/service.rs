//! Job orchestration: validation, queueing, navigation, classification,
//! extraction, and crash reporting.
//!
//! Requests are validated before they are queued so a malformed request is
//! rejected immediately instead of burning a queue slot. Everything after
//! that runs inside the queue, one job at a time on the warm session.

use std::{sync::Arc, time::{Duration, Instant}};

use {
    chromiumoxide::{Page, error::CdpError},
    lantern_config::LanternConfig,
    serde_json::Value,
    tracing::{debug, info},
    url::Url,
};

use crate::{
    blockers::{self, LiveProbe, catalog},
    error::{BrowserError, Result},
    extract::{
        self, fields,
        maps::{self, LivePanel, ScrollPlan},
        search::{self, SnippetFetcher},
    },
    queue::JobQueue,
    session::{LiveHandle, SessionManager},
    types::{FetchRequest, Health, JobOutput, MapsRequest, SearchRequest, validate_url},
};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The extraction gateway. One warm session, one queue, three job kinds.
#[derive(Clone)]
pub struct GateService {
    config: Arc<LanternConfig>,
    session: Arc<SessionManager>,
    queue: JobQueue<JobOutput>,
    snippets: Option<SnippetFetcher>,
}

impl GateService {
    pub fn new(config: LanternConfig) -> Result<Self> {
        let snippets = if config.search.snippet_fetch_enabled {
            Some(SnippetFetcher::new(
                config.search.snippet_fetch_max_attempts,
                config.search.snippet_fetch_timeout_ms,
            )?)
        } else {
            None
        };
        // Worker count equals the session's page-slot count, so every
        // worker can always check a page out.
        let session = Arc::new(SessionManager::new(config.browser.clone()));
        let queue = JobQueue::new(config.browser.concurrency);

        Ok(Self {
            config: Arc::new(config),
            session,
            queue,
            snippets,
        })
    }

    /// Navigate to a URL and extract from the landed page.
    pub async fn submit_fetch(&self, request: FetchRequest) -> Result<JobOutput> {
        validate_url(&request.url)?;
        if request.eval.is_some() && !self.config.browser.allow_eval {
            return Err(BrowserError::InvalidRequest(
                "eval is disabled; set browser.allow_eval = true to permit it".into(),
            ));
        }

        let service = self.clone();
        self.queue
            .submit(Box::new(move || {
                Box::pin(async move { service.run_fetch(request).await })
            }))
            .await
    }

    /// Run a web search and extract organic results.
    pub async fn submit_search(&self, request: SearchRequest) -> Result<JobOutput> {
        if request.query.trim().is_empty() {
            return Err(BrowserError::InvalidRequest("empty query".into()));
        }

        let service = self.clone();
        self.queue
            .submit(Box::new(move || {
                Box::pin(async move { service.run_search(request).await })
            }))
            .await
    }

    /// Run a maps search and collect places from the feed.
    pub async fn submit_maps(&self, request: MapsRequest) -> Result<JobOutput> {
        if request.query.trim().is_empty() {
            return Err(BrowserError::InvalidRequest("empty query".into()));
        }

        let service = self.clone();
        self.queue
            .submit(Box::new(move || {
                Box::pin(async move { service.run_maps(request).await })
            }))
            .await
    }

    pub async fn health(&self) -> Health {
        Health {
            ready: self.session.is_ready().await,
            queue_size: self.queue.queued(),
            pending: self.queue.running(),
        }
    }

    /// Tear down the warm session; the next job relaunches it.
    pub async fn reset_session(&self) {
        self.session.reset().await;
    }

    async fn run_fetch(&self, request: FetchRequest) -> Result<JobOutput> {
        let started = Instant::now();
        let handle = self.session.acquire().await?;
        let result = self.fetch_pipeline(&handle, &request).await;
        self.finish_job(handle, started, result).await
    }

    async fn run_search(&self, request: SearchRequest) -> Result<JobOutput> {
        let started = Instant::now();
        let handle = self.session.acquire().await?;
        let result = self.search_pipeline(&handle, &request).await;
        self.finish_job(handle, started, result).await
    }

    async fn run_maps(&self, request: MapsRequest) -> Result<JobOutput> {
        let started = Instant::now();
        let handle = self.session.acquire().await?;
        let result = self.maps_pipeline(&handle, &request).await;
        self.finish_job(handle, started, result).await
    }

    /// Stamp the duration on success; on failure, decide whether the
    /// session itself died and report it before propagating. The page slot
    /// goes back to the session either way (after a crash report the
    /// handle is stale and the release is a no-op).
    async fn finish_job(
        &self,
        handle: LiveHandle,
        started: Instant,
        result: Result<JobOutput>,
    ) -> Result<JobOutput> {
        let outcome = match result {
            Ok(mut output) => {
                output.duration_ms = started.elapsed().as_millis() as u64;
                Ok(output)
            },
            Err(e) => {
                if is_connection_dead(&e) {
                    self.session.mark_crashed(handle.generation).await;
                    Err(BrowserError::SessionCrashed(e.to_string()))
                } else {
                    Err(e)
                }
            },
        };
        self.session.release(handle).await;
        outcome
    }

    async fn fetch_pipeline(&self, handle: &LiveHandle, request: &FetchRequest) -> Result<JobOutput> {
        let page = &handle.page;
        let timeout = request
            .timeout_ms
            .unwrap_or(self.config.browser.navigation_timeout_ms);
        self.navigate(page, &request.url, timeout).await?;

        if let Some(selector) = &request.wait_selector {
            let wait = request
                .wait_timeout_ms
                .unwrap_or(self.config.browser.wait_timeout_ms);
            self.wait_for_selector(page, selector, wait).await;
        }

        let final_url = page.url().await?;

        let probe = LiveProbe::new(page);
        if let Some(verdict) = blockers::classify(&probe, &request.required_selectors).await {
            info!(url = %request.url, kind = ?verdict.kind, "page blocked");
            let mut output = JobOutput::blocked(&request.url, verdict);
            if let Some(u) = final_url {
                output = output.with_final_url(u);
            }
            if request.include_html {
                output = output.with_html(page.content().await?);
            }
            return Ok(output);
        }

        let mut output = JobOutput::completed(&request.url);
        if let Some(u) = final_url {
            output = output.with_final_url(u);
        }

        if !request.fields.is_empty() {
            let extracted = fields::extract_fields(page, &request.fields).await?;
            output = output.with_extracted(Value::Object(extracted));
        }

        // Unlike field extraction, a failing caller expression fails the
        // job; the caller asked for exactly this computation.
        if let Some(eval) = &request.eval {
            let value =
                extract::evaluate_expression(page, &eval.expression, eval.args.as_ref()).await?;
            output = output.with_evaluated(value);
        }

        if request.include_html {
            output = output.with_html(page.content().await?);
        }

        Ok(output)
    }

    async fn search_pipeline(
        &self,
        handle: &LiveHandle,
        request: &SearchRequest,
    ) -> Result<JobOutput> {
        let page = &handle.page;
        let url = Url::parse_with_params(
            &self.config.search.base_url,
            [
                ("q", request.query.as_str()),
                ("hl", self.config.browser.locale.as_str()),
            ],
        )
        .map_err(|e| BrowserError::InvalidRequest(format!("bad search base_url: {e}")))?;

        let timeout = request
            .timeout_ms
            .unwrap_or(self.config.browser.navigation_timeout_ms);
        self.navigate(page, url.as_str(), timeout).await?;
        self.wait_for_selector(page, "#search", self.config.browser.wait_timeout_ms)
            .await;

        let final_url = page.url().await?;

        // No required selectors here: a query can legitimately match
        // nothing, and an empty result list must come back COMPLETED.
        let probe = LiveProbe::new(page);
        if let Some(verdict) = blockers::classify(&probe, &[]).await {
            info!(query = %request.query, kind = ?verdict.kind, "search blocked");
            let mut output = JobOutput::blocked(url.as_str(), verdict);
            if let Some(u) = final_url {
                output = output.with_final_url(u);
            }
            if request.include_html {
                output = output.with_html(page.content().await?);
            }
            return Ok(output);
        }

        let limit = request.limit.unwrap_or(self.config.search.max_results);
        let harvest = search::harvest(page).await?;
        let top_stories = harvest.top_stories.clone();
        let ai_overview = harvest.ai_overview.clone();
        let mut results = search::assemble(harvest.cards, limit);

        // Enrichment is a fallback path: it only runs when the page
        // yielded fewer results than the configured threshold.
        if let Some(fetcher) = &self.snippets {
            if snippet_fallback_applies(results.len(), self.config.search.snippet_fetch_budget) {
                fetcher.enrich(&mut results).await;
            }
        }

        debug!(query = %request.query, results = results.len(), "search extracted");

        let mut output = JobOutput::completed(url.as_str())
            .with_search_results(results)
            .with_top_stories(top_stories)
            .with_ai_overview(ai_overview);
        if let Some(u) = final_url {
            output = output.with_final_url(u);
        }
        if request.include_html {
            output = output.with_html(page.content().await?);
        }
        Ok(output)
    }

    async fn maps_pipeline(&self, handle: &LiveHandle, request: &MapsRequest) -> Result<JobOutput> {
        let page = &handle.page;
        let mut url = Url::parse(&self.config.maps.base_url)
            .map_err(|e| BrowserError::InvalidRequest(format!("bad maps base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BrowserError::InvalidRequest("maps base_url cannot be a base".into()))?
            .push(&request.query);

        let timeout = request
            .timeout_ms
            .unwrap_or(self.config.browser.navigation_timeout_ms);
        self.navigate(page, url.as_str(), timeout).await?;
        self.wait_for_selector(
            page,
            catalog::MAPS_FEED_SELECTOR,
            self.config.browser.wait_timeout_ms,
        )
        .await;

        let final_url = page.url().await?;

        // The feed element is required, not the place cards: a rendered
        // feed with zero matches is a legitimate empty result.
        let probe = LiveProbe::new(page);
        let required = vec![catalog::MAPS_FEED_SELECTOR.to_owned()];
        if let Some(verdict) = blockers::classify(&probe, &required).await {
            info!(query = %request.query, kind = ?verdict.kind, "maps blocked");
            let mut output = JobOutput::blocked(url.as_str(), verdict);
            if let Some(u) = final_url {
                output = output.with_final_url(u);
            }
            if request.include_html {
                output = output.with_html(page.content().await?);
            }
            return Ok(output);
        }

        let limit = request.limit.unwrap_or(self.config.maps.default_limit);
        let plan = ScrollPlan {
            limit,
            max_passes: if request.scroll {
                self.config.maps.scroll_max_passes
            } else {
                0
            },
            settle: Duration::from_millis(self.config.maps.scroll_settle_ms),
        };
        let panel = LivePanel::new(page);
        let entries = maps::collect_scrolled(&panel, plan).await?;

        debug!(query = %request.query, places = entries.len(), "maps extracted");

        let mut output = JobOutput::completed(url.as_str()).with_maps_entries(entries);
        if let Some(u) = final_url {
            output = output.with_final_url(u);
        }
        if request.include_html {
            output = output.with_html(page.content().await?);
        }
        Ok(output)
    }

    async fn navigate(&self, page: &Page, url: &str, timeout_ms: u64) -> Result<()> {
        let navigation = tokio::time::timeout(Duration::from_millis(timeout_ms), page.goto(url));
        match navigation.await {
            Ok(Ok(_)) => {},
            Ok(Err(CdpError::Timeout)) => return Err(BrowserError::NavigationTimeout(timeout_ms)),
            Ok(Err(e)) => return Err(BrowserError::NavigationFailed(e.to_string())),
            Err(_) => return Err(BrowserError::NavigationTimeout(timeout_ms)),
        }
        // Redirect chains may still be settling; a failure here is not
        // fatal, the page is inspected as-is.
        if let Err(e) = page.wait_for_navigation().await {
            debug!(url, error = %e, "wait_for_navigation after goto failed");
        }
        Ok(())
    }

    /// Poll for a selector. This wait is soft: on timeout the pipeline
    /// proceeds and classification decides what the page actually is.
    async fn wait_for_selector(&self, page: &Page, selector: &str, timeout_ms: u64) -> bool {
        let quoted = match serde_json::to_string(selector) {
            Ok(q) => q,
            Err(_) => return false,
        };
        let js = format!("document.querySelector({quoted}) !== null");
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Ok(eval) = page.evaluate(js.as_str()).await {
                if eval.into_value::<bool>().unwrap_or(false) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                debug!(selector, timeout_ms, "selector did not appear, proceeding");
                return false;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

/// Whether missing snippets may be filled from the result pages directly:
/// only when the extraction produced fewer results than the threshold.
fn snippet_fallback_applies(result_count: usize, budget: usize) -> bool {
    result_count < budget
}

/// Whether an error means the CDP connection behind the session is gone,
/// as opposed to a page-level failure.
fn is_connection_dead(error: &BrowserError) -> bool {
    let text = error.to_string();
    text.contains("AlreadyClosed")
        || text.contains("ConnectionClosed")
        || text.contains("connection closed")
        || text.contains("Browser closed")
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> GateService {
        GateService::new(LanternConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn eval_is_rejected_when_disabled() {
        let svc = service();
        let request = FetchRequest {
            url: "https://example.com".into(),
            wait_selector: None,
            required_selectors: vec![],
            fields: vec![],
            eval: Some(crate::types::EvalSpec {
                expression: "() => 1".into(),
                args: None,
            }),
            include_html: false,
            timeout_ms: None,
            wait_timeout_ms: None,
        };

        let err = svc.submit_fetch(request).await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidRequest(_)));
        assert!(err.to_string().contains("allow_eval"));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_queueing() {
        let svc = service();
        let request = FetchRequest {
            url: "ftp://example.com/file".into(),
            wait_selector: None,
            required_selectors: vec![],
            fields: vec![],
            eval: None,
            include_html: false,
            timeout_ms: None,
            wait_timeout_ms: None,
        };

        let err = svc.submit_fetch(request).await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidRequest(_)));
        // Nothing reached the queue.
        assert_eq!(svc.queue.queued(), 0);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let svc = service();
        let err = svc
            .submit_search(SearchRequest {
                query: "   ".into(),
                limit: None,
                include_html: false,
                timeout_ms: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn health_reports_cold_idle_gateway() {
        let svc = service();
        let health = svc.health().await;
        assert!(!health.ready);
        assert_eq!(health.queue_size, 0);
        assert_eq!(health.pending, 0);
    }

    #[test]
    fn snippet_fallback_gates_on_result_count() {
        assert!(snippet_fallback_applies(0, 5));
        assert!(snippet_fallback_applies(4, 5));
        assert!(!snippet_fallback_applies(5, 5));
        assert!(!snippet_fallback_applies(10, 5));
    }

    #[test]
    fn dead_connection_detection() {
        assert!(is_connection_dead(&BrowserError::Cdp(
            "Ws(AlreadyClosed)".into()
        )));
        assert!(is_connection_dead(&BrowserError::Cdp(
            "ConnectionClosed".into()
        )));
        assert!(!is_connection_dead(&BrowserError::NavigationFailed(
            "net::ERR_NAME_NOT_RESOLVED".into()
        )));
    }
}
