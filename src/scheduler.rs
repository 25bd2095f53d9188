//! Crawl scheduler (component F).
//!
//! Seeds the frontier, fans out to `tab_concurrency` tabs sharing one request
//! channel, and stops the crawl on whichever of the two termination conditions
//! fires first: the hard `crawl_total_time` deadline, or idle convergence (the
//! store stops growing and the frontier sits empty for a full
//! `wait_js_exec_time` window).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cdp::CdpClient;
use crate::context::CrawlContext;
use crate::error::CrawlErrorKind;
use crate::model::{Method, Request, Source};
use crate::tab::Tab;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_TAB_RESTARTS: u32 = 3;
const TAB_RESTART_COOLDOWN_UNIT: Duration = Duration::from_secs(5);

/// Runs one crawl to completion against an already-connected browser.
///
/// Blocks until termination, then cancels `ctx` and waits for every tab to shut
/// down. The caller is responsible for writing `ctx.store.snapshot()` to the
/// output file afterwards.
pub async fn run(ctx: Arc<CrawlContext>, client: Arc<CdpClient>, entrance: &str) {
    seed_entrance(&ctx, entrance);
    if ctx.config.seed_from_robots_sitemap {
        seed_from_robots_sitemap(&ctx, entrance).await;
    }

    let mut tab_handles = Vec::with_capacity(ctx.config.tab_concurrency);
    for i in 0..ctx.config.tab_concurrency {
        let ctx = Arc::clone(&ctx);
        let client = Arc::clone(&client);
        let tab_id = format!("tab-{i}");
        tab_handles.push(tokio::spawn(supervise_tab(tab_id, client, ctx)));
    }

    watch_termination(&ctx).await;
    ctx.cancel.cancel();

    for handle in tab_handles {
        let _ = handle.await;
    }
}

/// Offers the entrance request through the store/frontier funnel CDP event
/// handlers use.
fn seed_entrance(ctx: &Arc<CrawlContext>, entrance: &str) {
    let entrance_req =
        Request::new(Method::Get, entrance, Source::Entrance).with_headers(ctx.base_headers());
    crate::store::offer(&ctx.store, &ctx.frontier, &ctx.visited, entrance_req);
}

/// Fetches robots.txt/sitemap.xml seed URLs (§4.K) on a blocking-pool thread,
/// via the same process-wide `ureq` client the redirect harvester uses (§5's
/// "one process-wide client" requirement), then offers each one.
async fn seed_from_robots_sitemap(ctx: &Arc<CrawlContext>, entrance: &str) {
    let agent = ctx.http_client.clone();
    let entrance = entrance.to_string();
    let urls = tokio::task::spawn_blocking(move || crate::seed::collect_seed_urls(&agent, &entrance))
        .await
        .unwrap_or_default();

    tracing::info!(count = urls.len(), "collected seed urls");
    for url in urls {
        let req = Request::new(Method::Get, url, Source::Seed).with_headers(ctx.base_headers());
        crate::store::offer(&ctx.store, &ctx.frontier, &ctx.visited, req);
    }
}

/// Supervises one tab slot: runs it, and on a genuine panic (not a cancellation)
/// restarts up to [`MAX_TAB_RESTARTS`] times with an escalating cooldown.
async fn supervise_tab(tab_id: String, client: Arc<CdpClient>, ctx: Arc<CrawlContext>) {
    let mut restarts = 0u32;
    loop {
        if ctx.cancel.is_cancelled() {
            return;
        }

        let id = tab_id.clone();
        let client = Arc::clone(&client);
        let ctx_for_tab = Arc::clone(&ctx);
        let result = tokio::spawn(async move { run_tab(id, client, ctx_for_tab).await }).await;

        match result {
            Ok(()) => return,
            Err(join_err) if join_err.is_panic() => {
                if restarts >= MAX_TAB_RESTARTS {
                    tracing::error!(tab = %tab_id, "tab exhausted its restart budget, giving up");
                    return;
                }
                restarts += 1;
                let cooldown = TAB_RESTART_COOLDOWN_UNIT * restarts;
                tracing::warn!(tab = %tab_id, restarts, cooldown_secs = cooldown.as_secs(), "tab panicked, restarting");
                tokio::select! {
                    () = tokio::time::sleep(cooldown) => {}
                    () = ctx.cancel.cancelled() => return,
                }
            }
            Err(_) => return,
        }
    }
}

/// Drives one tab: initializes it, runs its CDP event-subscription loop
/// concurrently with serial consumption of the shared frontier, until
/// cancellation fires.
async fn run_tab(tab_id: String, client: Arc<CdpClient>, ctx: Arc<CrawlContext>) {
    let tab = match Tab::spawn(tab_id.clone(), &client, Arc::clone(&ctx)).await {
        Ok(tab) => Arc::new(tab),
        Err(e) => {
            tracing::error!(tab = %tab_id, error = %e, "failed to initialize tab");
            return;
        }
    };

    let event_tab = Arc::clone(&tab);
    let event_client = Arc::clone(&client);
    let event_tab_id = tab_id.clone();
    let event_loop = tokio::spawn(async move {
        if let Err(e) = event_tab.run_event_loop(&event_client).await {
            tracing::warn!(tab = %event_tab_id, error = %e, "tab event loop ended with an error");
        }
    });

    loop {
        tokio::select! {
            () = ctx.cancel.cancelled() => break,
            maybe_req = ctx.frontier.pop() => {
                match maybe_req {
                    Some(req) => {
                        ctx.progress.increment_processed();
                        if let Err(e) = tab.process(req).await {
                            if e.kind != CrawlErrorKind::NavigationAborted {
                                tracing::warn!(tab = %tab_id, error = %e, "navigation error");
                                ctx.progress.increment_errors();
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    event_loop.abort();
}

/// Polls once per [`SAMPLE_INTERVAL`] for either termination condition, or
/// returns early if the context is cancelled from outside (e.g. a signal).
async fn watch_termination(ctx: &Arc<CrawlContext>) {
    let deadline = Instant::now() + ctx.config.crawl_total_time;
    let mut idle_since: Option<Instant> = None;
    let mut last_count = ctx.store.count();

    loop {
        tokio::select! {
            () = ctx.cancel.cancelled() => return,
            () = tokio::time::sleep(SAMPLE_INTERVAL) => {}
        }

        let count = ctx.store.count();
        ctx.progress.set_stored(count as u64);
        ctx.progress.set_queued(ctx.frontier.len() as u64);

        if Instant::now() >= deadline {
            tracing::info!("crawl total time reached");
            return;
        }

        if count == last_count && ctx.frontier.is_empty() {
            let since = *idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= ctx.config.wait_js_exec_time {
                tracing::info!("frontier idle, converged");
                return;
            }
        } else {
            idle_since = None;
        }
        last_count = count;
    }
}
