//! Command-line surface (component H).
//!
//! Unlike the host's twelve-subcommand CLI, this crate is single-purpose: one
//! positional entrance URL plus flags that mirror [`crate::config::CliOverrides`]
//! field-for-field, so [`Cli::to_overrides`] is a straight copy.

use std::path::PathBuf;

use clap::Parser;

use crate::config::CliOverrides;

#[derive(Parser)]
#[command(
    name = "flamingo-crawler",
    version,
    about = "Browser-driven request-discovery crawler for web-vulnerability scanners",
    long_about = "flamingo-crawler drives a real Chromium instance over the Chrome DevTools \
        Protocol, navigating a site and exercising its pages (links, forms, DOM events) to \
        discover every HTTP request the application actually issues. Discovered requests are \
        written as a JSON array for downstream scanners to replay.\n\n\
        Configuration layers in order of precedence: command-line flags, a config file \
        (TOML or YAML, found via --config or the usual search path), then built-in defaults.",
    term_width = 100
)]
pub struct Cli {
    /// Entrance URL to start crawling from. Must start with http:// or https://.
    pub url: String,

    /// User-Agent header sent on every request.
    #[arg(long, env = "FLAMINGO_UA")]
    pub ua: Option<String>,

    /// Cookie header sent on every request, e.g. "session=abc; theme=dark".
    #[arg(long, env = "FLAMINGO_COOKIE")]
    pub cookie: Option<String>,

    /// Run Chrome with a visible window instead of headless.
    #[arg(long)]
    pub gui: bool,

    /// Path to a Chrome/Chromium executable. Auto-discovered if omitted.
    #[arg(long, value_name = "PATH")]
    pub chromium_path: Option<String>,

    /// HTTP/HTTPS proxy Chrome should route all traffic through.
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Per-navigation timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub tab_timeout: Option<u64>,

    /// How long to let in-page JavaScript settle after load, in seconds.
    #[arg(long, value_name = "SECS")]
    pub wait_js_exec_time: Option<u64>,

    /// Hard ceiling on total crawl duration, in seconds.
    #[arg(long, value_name = "SECS")]
    pub crawl_total_time: Option<u64>,

    /// Number of tabs crawling concurrently.
    #[arg(long, value_name = "N")]
    pub tab_concurrency: Option<usize>,

    /// Maximum number of distinct requests to record before the store stops growing.
    #[arg(long, value_name = "N")]
    pub max_requests: Option<usize>,

    /// Also seed the frontier from robots.txt and sitemap.xml.
    #[arg(long)]
    pub seed_from_robots_sitemap: bool,

    /// Path to write the discovered-requests JSON array to.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<String>,

    /// Explicit config file path (TOML or YAML). Overrides the usual search order.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, or error.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Suppress the terminal progress line.
    #[arg(long)]
    pub quiet: bool,
}

impl Cli {
    /// Lifts the flags the user actually passed into [`CliOverrides`], leaving
    /// everything else `None` so config-file values and defaults still apply.
    #[must_use]
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            ua: self.ua.clone(),
            cookie: self.cookie.clone(),
            gui: self.gui.then_some(true),
            chromium_path: self.chromium_path.clone(),
            proxy: self.proxy.clone(),
            tab_timeout_secs: self.tab_timeout,
            wait_js_exec_time_secs: self.wait_js_exec_time,
            crawl_total_time_secs: self.crawl_total_time,
            tab_concurrency: self.tab_concurrency,
            max_requests: self.max_requests,
            seed_from_robots_sitemap: self.seed_from_robots_sitemap.then_some(true),
            output_path: self.output_path.clone(),
            log_level: self.log_level.clone(),
            quiet: self.quiet.then_some(true),
        }
    }
}
