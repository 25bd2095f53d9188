//! Tab runtime: one CDP session per tab, the request-interception state machine,
//! and the page-lifecycle driver (component D).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Notify;

use crate::cdp::{CdpClient, CdpEvent, CdpSession};
use crate::context::CrawlContext;
use crate::error::CrawlErrorKind;
use crate::intercept::{InterceptAction, classify_request};
use crate::model::{Method, Request, Source};
use crate::retry::{classify_error, retry_with_backoff};
use crate::scripts;
use crate::store;

const WORKER_POOL_SIZE: usize = 20;
const WORKER_QUEUE_DEPTH: usize = 1000;
const POST_LOAD_SETTLE: Duration = Duration::from_millis(200);
const STABILITY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STABILITY_QUIET_PERIOD_MS: u64 = 500;
/// Per spec.md §4.G: "default 2 attempts" for retryable navigation errors.
const NAVIGATION_RETRY_ATTEMPTS: u32 = 2;
const NAVIGATION_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Per-tab mutable state, written only by the tab's own task.
#[derive(Default)]
struct TabState {
    navigating: Option<Request>,
    top_frame_id: Option<String>,
}

/// Tracks in-flight event handlers for the current navigation, functioning as a
/// `WaitGroup` the main loop can await alongside a timeout.
#[derive(Default)]
struct HandlerTracker {
    count: AtomicUsize,
    idle: Notify,
}

impl HandlerTracker {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }
}

/// A queued unit of handler work: the boxed future that runs one CDP event's
/// handler to completion.
type Work = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

pub struct Tab {
    id: String,
    target_id: String,
    session: CdpSession,
    state: RwLock<TabState>,
    handlers: Arc<HandlerTracker>,
    ctx: Arc<CrawlContext>,
    /// Feeds a fixed pool of `WORKER_POOL_SIZE` worker tasks (spawned once in
    /// [`Tab::spawn`]) through a channel bounded at `WORKER_QUEUE_DEPTH`, giving
    /// the per-tab worker pool an actual bound on both concurrency and queue
    /// depth rather than just concurrency.
    work_tx: tokio::sync::mpsc::Sender<Work>,
}

impl Tab {
    /// Creates a new top-level target, attaches a session, enables every CDP
    /// domain the crawler needs, and installs the anti-detection and init-hook
    /// bundles on every future document.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlErrorKind::CdpProtocol`] if target creation, attachment, or
    /// any setup command fails.
    pub async fn spawn(
        id: impl Into<String>,
        client: &CdpClient,
        ctx: Arc<CrawlContext>,
    ) -> Result<Self, crate::error::CrawlError> {
        let id = id.into();

        let created = client
            .send_command("Target.createTarget", Some(json!({ "url": "about:blank" })))
            .await
            .map_err(cdp_err)?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| crate::error::CrawlError::new(CrawlErrorKind::CdpProtocol, "missing targetId"))?
            .to_string();

        let session = client.create_session(&target_id).await.map_err(cdp_err)?;

        session.send_command("Network.enable", None).await.map_err(cdp_err)?;
        session
            .send_command("Fetch.enable", Some(json!({ "patterns": [{ "urlPattern": "*" }] })))
            .await
            .map_err(cdp_err)?;
        session.send_command("Page.enable", None).await.map_err(cdp_err)?;
        session.send_command("Runtime.enable", None).await.map_err(cdp_err)?;
        session
            .send_command("Runtime.addBinding", Some(json!({ "name": "sendLink" })))
            .await
            .map_err(cdp_err)?;

        for bundle in [scripts::ANTI_DETECTION_JS, scripts::INIT_HOOK_JS] {
            session
                .send_command(
                    "Page.addScriptToEvaluateOnNewDocument",
                    Some(json!({ "source": bundle })),
                )
                .await
                .map_err(cdp_err)?;
        }

        let (work_tx, work_rx) = tokio::sync::mpsc::channel::<Work>(WORKER_QUEUE_DEPTH);
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
        for _ in 0..WORKER_POOL_SIZE {
            let work_rx = Arc::clone(&work_rx);
            tokio::spawn(async move {
                loop {
                    let work = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    match work {
                        Some(work) => work.await,
                        None => return,
                    }
                }
            });
        }

        Ok(Self {
            id,
            target_id,
            session,
            state: RwLock::new(TabState::default()),
            handlers: Arc::new(HandlerTracker::default()),
            ctx,
            work_tx,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drives one frontier item to completion: sets headers, navigates, and
    /// drains its event handlers until they finish, `tab_timeout` elapses, or
    /// cancellation fires.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CrawlError`](crate::error::CrawlError) on navigation
    /// failure. `NavigationAborted` is expected (the interception machine aborts
    /// navigations deliberately) and callers should treat it as a non-fatal skip.
    pub async fn process(&self, req: Request) -> Result<(), crate::error::CrawlError> {
        {
            let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.navigating = Some(req.clone());
        }

        let headers_value: serde_json::Value = req
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into();

        self.session
            .send_command("Network.setExtraHTTPHeaders", Some(json!({ "headers": headers_value })))
            .await
            .map_err(cdp_err)?;

        let nav_result = retry_with_backoff(
            || self.session.send_command("Page.navigate", Some(json!({ "url": req.url }))),
            NAVIGATION_RETRY_ATTEMPTS,
            NAVIGATION_RETRY_BASE_DELAY,
        )
        .await;

        if let Err(e) = nav_result {
            let kind = classify_error(&e.to_string());
            return Err(crate::error::CrawlError::new(kind, e.to_string()).with_url(req.url.clone()));
        }

        let wait = self.handlers.wait_idle();
        tokio::select! {
            () = wait => {}
            () = tokio::time::sleep(self.ctx.config.tab_timeout) => {
                tracing::warn!(tab = %self.id, url = %req.url, "tab timed out awaiting handlers");
            }
            () = self.ctx.cancel.cancelled() => {}
        }

        Ok(())
    }

    /// Subscribes to every CDP event kind the tab cares about and dispatches them
    /// onto the bounded per-tab worker pool (`WORKER_POOL_SIZE` workers draining a
    /// `WORKER_QUEUE_DEPTH`-deep queue, started once in [`Tab::spawn`]) until
    /// cancellation fires.
    pub async fn run_event_loop(self: &Arc<Self>, client: &CdpClient) -> Result<(), crate::error::CrawlError> {
        let mut request_will_be_sent = self.session.subscribe("Network.requestWillBeSent").await.map_err(cdp_err)?;
        let mut request_paused = self.session.subscribe("Fetch.requestPaused").await.map_err(cdp_err)?;
        let mut load_event_fired = self.session.subscribe("Page.loadEventFired").await.map_err(cdp_err)?;
        let mut dialog_opening = self.session.subscribe("Page.javascriptDialogOpening").await.map_err(cdp_err)?;
        let mut binding_called = self.session.subscribe("Runtime.bindingCalled").await.map_err(cdp_err)?;
        let mut target_created = client.subscribe("Target.targetCreated").await.map_err(cdp_err)?;

        loop {
            tokio::select! {
                () = self.ctx.cancel.cancelled() => return Ok(()),
                Some(event) = request_will_be_sent.recv() => self.dispatch(event, Self::on_request_will_be_sent),
                Some(event) = request_paused.recv() => self.dispatch(event, Self::on_request_paused),
                Some(event) = load_event_fired.recv() => self.dispatch(event, Self::on_load_event_fired),
                Some(event) = dialog_opening.recv() => self.dispatch(event, Self::on_dialog_opening),
                Some(event) = binding_called.recv() => self.dispatch(event, Self::on_binding_called),
                Some(event) = target_created.recv() => self.dispatch(event, Self::on_target_created),
                else => return Ok(()),
            }
        }
    }

    /// Queues one event's handler onto the bounded worker channel. If the queue
    /// is already at `WORKER_QUEUE_DEPTH`, the event is dropped and logged rather
    /// than growing an unbounded number of pending tasks.
    fn dispatch<F, Fut>(self: &Arc<Self>, event: CdpEvent, handler: F)
    where
        F: FnOnce(Arc<Self>, CdpEvent) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let tab = Arc::clone(self);
        self.handlers.enter();
        let tracker = Arc::clone(&self.handlers);
        let work: Work = Box::pin(async move {
            handler(tab, event).await;
            tracker.exit();
        });

        if self.work_tx.try_send(work).is_err() {
            tracing::warn!(tab = %self.id, "tab worker queue full, dropping event handler");
            self.handlers.exit();
        }
    }

    async fn on_request_will_be_sent(self: Arc<Self>, event: CdpEvent) {
        #[derive(Deserialize)]
        struct Params {
            #[serde(rename = "requestId")]
            request_id: String,
            #[serde(rename = "loaderId")]
            loader_id: Option<String>,
            #[serde(rename = "frameId")]
            frame_id: String,
            #[serde(rename = "type")]
            resource_type: Option<String>,
            request: RequestParams,
            #[serde(rename = "redirectResponse")]
            redirect_response: Option<RedirectResponse>,
        }
        #[derive(Deserialize)]
        struct RequestParams {
            url: String,
        }
        #[derive(Deserialize)]
        struct RedirectResponse {
            url: String,
        }

        let Ok(params) = serde_json::from_value::<Params>(event.params) else {
            return;
        };

        let is_top_level_nav = params.resource_type.as_deref() == Some("Document")
            && params.loader_id.as_deref() == Some(params.request_id.as_str());

        if is_top_level_nav {
            let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.top_frame_id = Some(params.frame_id.clone());
        }

        if let Some(redirect) = params.redirect_response {
            self.harvest_redirect_links(&redirect.url).await;
        }
    }

    /// Fetches the redirect target out-of-band (non-following client), extracts
    /// `<a href>` targets, and offers each as a `GET … source=redirect` request.
    async fn harvest_redirect_links(&self, redirect_url: &str) {
        let client = self.ctx.http_client.clone();
        let redirect_url = redirect_url.to_string();
        let base = redirect_url.clone();

        let html = tokio::task::spawn_blocking(move || {
            let mut response = client.get(&redirect_url).call().ok()?;
            response.body_mut().read_to_string().ok()
        })
        .await
        .ok()
        .flatten();

        let Some(html) = html else { return };
        let Ok(base_url) = url::Url::parse(&base) else { return };

        let document = kuchiki::parse_html().one(html);
        let hrefs: Vec<String> = document
            .select("a[href]")
            .map(|matches| {
                matches
                    .filter_map(|m| {
                        m.attributes
                            .borrow()
                            .get("href")
                            .and_then(|href| base_url.join(href).ok())
                            .map(|u| u.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        for href in hrefs {
            let req = Request::new(Method::Get, href, Source::Redirect).with_headers(self.ctx.base_headers());
            store::offer(&self.ctx.store, &self.ctx.frontier, &self.ctx.visited, req);
        }
    }

    async fn on_request_paused(self: Arc<Self>, event: CdpEvent) {
        #[derive(Deserialize)]
        struct Params {
            #[serde(rename = "requestId")]
            request_id: String,
            request: RequestParams,
            #[serde(rename = "resourceType")]
            resource_type: String,
            #[serde(rename = "frameId")]
            frame_id: String,
            #[serde(rename = "responseStatusCode")]
            response_status_code: Option<i64>,
        }
        #[derive(Deserialize)]
        struct RequestParams {
            url: String,
            method: String,
            #[serde(rename = "hasPostData")]
            has_post_data: Option<bool>,
        }

        let Ok(params) = serde_json::from_value::<Params>(event.params) else {
            return;
        };
        // Response-stage pauses (a status code is present) are not request-stage
        // decisions; just let them through.
        if params.response_status_code.is_some() {
            let _ = self
                .session
                .send_command("Fetch.continueRequest", Some(json!({ "requestId": params.request_id })))
                .await;
            return;
        }

        let method = Method::parse(&params.request.method);
        let (top_frame_id, navigating_url) = {
            let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            (
                state.top_frame_id.clone().unwrap_or_default(),
                state.navigating.as_ref().map(|r| r.url.clone()).unwrap_or_default(),
            )
        };

        let action = classify_request(
            &params.resource_type,
            &params.request.url,
            method,
            &params.frame_id,
            &top_frame_id,
            &navigating_url,
        );

        match action {
            InterceptAction::FailAborted { record } => {
                let _ = self
                    .session
                    .send_command(
                        "Fetch.failRequest",
                        Some(json!({ "requestId": params.request_id, "errorReason": "Aborted" })),
                    )
                    .await;
                if let Some(source) = record {
                    let body = if params.request.has_post_data.unwrap_or(false) {
                        self.fetch_post_data(&params.request_id).await
                    } else {
                        Vec::new()
                    };
                    self.offer_discovered(method, params.request.url, source, body);
                }
            }
            InterceptAction::Continue => {
                let _ = self
                    .session
                    .send_command("Fetch.continueRequest", Some(json!({ "requestId": params.request_id })))
                    .await;
            }
            InterceptAction::ContinueAndRecord { source } => {
                let body = if params.request.has_post_data.unwrap_or(false) {
                    self.fetch_post_data(&params.request_id).await
                } else {
                    Vec::new()
                };
                let _ = self
                    .session
                    .send_command("Fetch.continueRequest", Some(json!({ "requestId": params.request_id })))
                    .await;
                self.offer_discovered(method, params.request.url, source, body);
            }
        }
    }

    async fn fetch_post_data(&self, request_id: &str) -> Vec<u8> {
        use base64::Engine;
        let Ok(result) = self
            .session
            .send_command("Network.getRequestPostData", Some(json!({ "requestId": request_id })))
            .await
        else {
            return Vec::new();
        };
        result["postData"]
            .as_str()
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
            .unwrap_or_default()
    }

    fn offer_discovered(&self, method: Method, url: String, source: Source, body: Vec<u8>) {
        let req = Request::new(method, url, source)
            .with_headers(self.ctx.base_headers())
            .with_body(body);
        store::offer(&self.ctx.store, &self.ctx.frontier, &self.ctx.visited, req);
    }

    async fn on_target_created(self: Arc<Self>, event: CdpEvent) {
        #[derive(Deserialize)]
        struct Params {
            #[serde(rename = "targetInfo")]
            target_info: TargetInfo,
        }
        #[derive(Deserialize)]
        struct TargetInfo {
            #[serde(rename = "targetId")]
            target_id: String,
            #[serde(rename = "openerId")]
            opener_id: Option<String>,
        }

        let Ok(params) = serde_json::from_value::<Params>(event.params) else {
            return;
        };

        if params.target_info.opener_id.as_deref() == Some(self.target_id.as_str()) {
            let _ = self
                .session
                .send_command("Target.closeTarget", Some(json!({ "targetId": params.target_info.target_id })))
                .await;
        }
    }

    async fn on_load_event_fired(self: Arc<Self>, _event: CdpEvent) {
        tokio::time::sleep(POST_LOAD_SETTLE).await;

        for bundle in [
            scripts::MUTATION_OBSERVER_JS,
            scripts::COLLECT_AND_TRIGGER_JS,
            scripts::FILL_AND_SUBMIT_FORMS_JS,
        ] {
            let _ = self
                .session
                .send_command("Runtime.evaluate", Some(json!({ "expression": bundle })))
                .await;
        }

        let deadline = tokio::time::Instant::now() + self.ctx.config.wait_js_exec_time;
        let stability_check = format!(
            "window.__flamingoStability ? window.__flamingoStability.isStable({STABILITY_QUIET_PERIOD_MS}) : true"
        );

        loop {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            let Ok(result) = self
                .session
                .send_command("Runtime.evaluate", Some(json!({ "expression": stability_check, "returnByValue": true })))
                .await
            else {
                break;
            };
            if result["result"]["value"].as_bool().unwrap_or(true) {
                break;
            }
            tokio::time::sleep(STABILITY_POLL_INTERVAL).await;
        }
    }

    async fn on_dialog_opening(self: Arc<Self>, _event: CdpEvent) {
        let _ = self
            .session
            .send_command("Page.handleJavaScriptDialog", Some(json!({ "accept": false })))
            .await;
    }

    async fn on_binding_called(self: Arc<Self>, event: CdpEvent) {
        #[derive(Deserialize)]
        struct Params {
            name: String,
            payload: String,
        }
        #[derive(Deserialize)]
        struct LinkPayload {
            url: String,
            source: String,
        }

        let Ok(params) = serde_json::from_value::<Params>(event.params) else {
            return;
        };
        if params.name != "sendLink" {
            return;
        }
        let Ok(payload) = serde_json::from_str::<LinkPayload>(&params.payload) else {
            return;
        };

        self.offer_discovered(Method::Get, payload.url, Source::parse(&payload.source), Vec::new());
    }
}

fn cdp_err(e: crate::cdp::CdpError) -> crate::error::CrawlError {
    crate::error::CrawlError::new(CrawlErrorKind::CdpProtocol, e.to_string())
}
