use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use flamingo_crawler::chrome::{Channel, LaunchConfig, crawler_extra_args, find_available_port, find_chrome_executable, launch_chrome, query_version};
use flamingo_crawler::cli::Cli;
use flamingo_crawler::config;
use flamingo_crawler::context::CrawlContext;
use flamingo_crawler::error::AppError;
use flamingo_crawler::logging;
use flamingo_crawler::output;
use flamingo_crawler::scheduler;
use flamingo_crawler::{cdp::{CdpClient, CdpConfig}, canon};

const CHROME_LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.print_json_stderr();
        std::process::exit(e.code as i32);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if !cli.url.starts_with("http://") && !cli.url.starts_with("https://") {
        return Err(AppError::invalid_entrance_url(&cli.url));
    }
    if canon::canonicalize(&cli.url).is_err() {
        return Err(AppError::invalid_entrance_url(&cli.url));
    }

    let (config_path, config_file) = config::load_config(cli.config.as_deref());
    let overrides = cli.to_overrides();
    let resolved = config::resolve_config(&config_file, &overrides, config_path);

    logging::init(&resolved.log_level);

    // SAFETY: called once, before any other thread is spawned.
    unsafe {
        std::env::set_var("ENTRANCE_URL", &cli.url);
    }

    tracing::info!(
        url = %cli.url,
        tabs = resolved.tab_concurrency,
        output = %resolved.output_path.display(),
        "starting crawl"
    );

    let ctx = Arc::new(CrawlContext::new(cli.url.clone(), resolved));

    install_signal_handler(Arc::clone(&ctx));
    let progress_handle = spawn_progress_reporter(&ctx);

    let executable = match &ctx.config.chromium_path {
        Some(path) => PathBuf::from(path),
        None => find_chrome_executable(Channel::Stable)?,
    };

    let port = find_available_port()?;
    let extra_args = crawler_extra_args(Some(&ctx.config.ua), ctx.config.proxy.as_deref(), ctx.config.gui);
    let launch_config = LaunchConfig {
        executable,
        port,
        headless: !ctx.config.gui,
        extra_args,
        user_data_dir: None,
    };

    let process = launch_chrome(launch_config, CHROME_LAUNCH_TIMEOUT).await?;
    tracing::info!(pid = process.pid(), port, "chrome launched");

    let version = query_version("127.0.0.1", port).await?;
    let client = Arc::new(CdpClient::connect(&version.ws_debugger_url, CdpConfig::default()).await?);

    scheduler::run(Arc::clone(&ctx), Arc::clone(&client), &cli.url).await;

    progress_handle.abort();
    if let Ok(client) = Arc::try_unwrap(client) {
        let _ = client.close().await;
    }
    drop(process);

    let snapshot = ctx.store.snapshot();
    output::write_requests(&ctx.config.output_path, &snapshot, false)?;
    tracing::info!(count = snapshot.len(), path = %ctx.config.output_path.display(), "crawl finished");

    Ok(())
}

/// Installs a Ctrl-C (and, on Unix, `SIGTERM`) handler that cancels the crawl
/// in place so already-discovered requests still get written out.
fn install_signal_handler(ctx: Arc<CrawlContext>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    ctx.cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::warn!("shutdown signal received, saving partial results");
        ctx.cancel.cancel();
    });
}

/// Bridges the crate's hand-rolled [`CancellationToken`](flamingo_crawler::cancel::CancellationToken)
/// into the `tokio::sync::watch` signal [`progress::spawn_reporter`] expects, and
/// starts it unless `--quiet` was passed.
fn spawn_progress_reporter(ctx: &Arc<CrawlContext>) -> tokio::task::JoinHandle<()> {
    if ctx.config.quiet {
        return tokio::spawn(async {});
    }

    let (tx, rx) = tokio::sync::watch::channel(false);
    let cancel = ctx.cancel.child();
    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = tx.send(true);
    });

    flamingo_crawler::progress::spawn_reporter(Arc::clone(&ctx.progress), PROGRESS_INTERVAL, rx)
}
