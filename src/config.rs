use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default config file template with comments, used as a starting point for users.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# flamingo-crawler configuration file
# See: https://github.com/Nunley-Media-Group/flamingo-crawler

# [browser]
# ua = "flamingo"
# cookie = ""
# gui = false
# chromium_path = "/path/to/chromium"

# [crawl]
# tab_timeout_secs = 180
# wait_js_exec_time_secs = 60
# crawl_total_time_secs = 1800
# tab_concurrency = 3
# max_requests = 100000
# seed_from_robots_sitemap = false

# [output]
# output_path = "requests.json"

# [logging]
# log_level = "info"
# quiet = false
"#;

// ---------------------------------------------------------------------------
// Config structs (parsed from TOML or YAML). All fields optional.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub browser: BrowserConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub ua: Option<String>,
    pub cookie: Option<String>,
    pub gui: Option<bool>,
    pub chromium_path: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub tab_timeout_secs: Option<u64>,
    pub wait_js_exec_time_secs: Option<u64>,
    pub crawl_total_time_secs: Option<u64>,
    pub tab_concurrency: Option<usize>,
    pub max_requests: Option<usize>,
    pub seed_from_robots_sitemap: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: Option<String>,
    pub quiet: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults filled in)
// ---------------------------------------------------------------------------

/// Fully resolved configuration with all defaults filled in; this is the struct
/// every other component actually consumes.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub ua: String,
    pub cookie_header: Option<String>,
    pub gui: bool,
    pub chromium_path: Option<String>,
    pub proxy: Option<String>,
    pub tab_timeout: Duration,
    pub wait_js_exec_time: Duration,
    pub crawl_total_time: Duration,
    pub tab_concurrency: usize,
    pub max_requests: usize,
    pub seed_from_robots_sitemap: bool,
    pub output_path: PathBuf,
    pub log_level: String,
    pub quiet: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_UA: &str = "flamingo";
const DEFAULT_TAB_TIMEOUT_SECS: u64 = 180;
const DEFAULT_WAIT_JS_EXEC_TIME_SECS: u64 = 60;
const DEFAULT_CRAWL_TOTAL_TIME_SECS: u64 = 1800;
const DEFAULT_TAB_CONCURRENCY: usize = 3;
const DEFAULT_MAX_REQUESTS: usize = 100_000;
const DEFAULT_OUTPUT_PATH: &str = "requests.json";
const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    AlreadyExists(PathBuf),
    NoConfigDir,
    InvalidEntranceUrl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config file error: {e}"),
            Self::AlreadyExists(p) => write!(f, "config file already exists: {}", p.display()),
            Self::NoConfigDir => write!(f, "could not determine config directory"),
            Self::InvalidEntranceUrl(url) => {
                write!(f, "entrance URL must start with http: {url}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for crate::error::AppError {
    fn from(e: ConfigError) -> Self {
        use crate::error::ExitCode;
        Self {
            message: e.to_string(),
            code: ExitCode::GeneralError,
            custom_json: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config file search
// ---------------------------------------------------------------------------

/// Search order: `--config` flag, `$FLAMINGO_CONFIG`, `./.flamingo.toml` /
/// `./.flamingo.yaml`, the platform config dir, `~/.flamingo.toml`.
#[must_use]
pub fn find_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    find_config_file_with(explicit_path, std::env::var("FLAMINGO_CONFIG").ok())
}

#[must_use]
pub fn find_config_file_with(
    explicit_path: Option<&Path>,
    env_config: Option<String>,
) -> Option<PathBuf> {
    if let Some(p) = explicit_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    if let Some(env_path) = env_config {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return Some(p);
        }
    }

    for local in [".flamingo.toml", ".flamingo.yaml", ".flamingo.yml"] {
        let p = PathBuf::from(local);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let xdg = config_dir.join("flamingo-crawler").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".flamingo.toml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

#[must_use]
pub fn load_config(explicit_path: Option<&Path>) -> (Option<PathBuf>, ConfigFile) {
    let path = find_config_file(explicit_path);
    match &path {
        Some(p) => (path.clone(), load_config_from(p)),
        None => (None, ConfigFile::default()),
    }
}

#[must_use]
pub fn load_config_from(path: &Path) -> ConfigFile {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("warning: could not read config file {}: {e}", path.display());
            return ConfigFile::default();
        }
    };

    parse_config(&contents, path)
}

/// True if `path`'s extension looks like YAML.
fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// Parses TOML or YAML content into a `ConfigFile`, dispatching on `path`'s extension.
///
/// TOML uses the two-pass strict/lenient strategy (strict first, to detect unknown
/// keys and warn; lenient as a fallback that still recovers the known fields). YAML
/// parses leniently only, since `serde_yaml` has no `deny_unknown_fields` wrapper
/// equivalent worth duplicating here.
#[must_use]
pub fn parse_config(contents: &str, path: &Path) -> ConfigFile {
    if is_yaml_path(path) {
        return match serde_yaml::from_str(contents) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("warning: could not parse config file {}: {e}", path.display());
                ConfigFile::default()
            }
        };
    }

    match toml::from_str::<StrictConfigFile>(contents) {
        Ok(strict) => strict.into(),
        Err(strict_err) => match toml::from_str::<ConfigFile>(contents) {
            Ok(config) => {
                eprintln!(
                    "warning: unknown keys in config file {}: {strict_err}",
                    path.display()
                );
                config
            }
            Err(parse_err) => {
                eprintln!("warning: could not parse config file {}: {parse_err}", path.display());
                ConfigFile::default()
            }
        },
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictConfigFile {
    #[serde(default)]
    browser: StrictBrowserConfig,
    #[serde(default)]
    crawl: StrictCrawlConfig,
    #[serde(default)]
    output: StrictOutputConfig,
    #[serde(default)]
    logging: StrictLoggingConfig,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictBrowserConfig {
    ua: Option<String>,
    cookie: Option<String>,
    gui: Option<bool>,
    chromium_path: Option<String>,
    proxy: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictCrawlConfig {
    tab_timeout_secs: Option<u64>,
    wait_js_exec_time_secs: Option<u64>,
    crawl_total_time_secs: Option<u64>,
    tab_concurrency: Option<usize>,
    max_requests: Option<usize>,
    seed_from_robots_sitemap: Option<bool>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictOutputConfig {
    output_path: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictLoggingConfig {
    log_level: Option<String>,
    quiet: Option<bool>,
}

impl From<StrictConfigFile> for ConfigFile {
    fn from(s: StrictConfigFile) -> Self {
        Self {
            browser: BrowserConfig {
                ua: s.browser.ua,
                cookie: s.browser.cookie,
                gui: s.browser.gui,
                chromium_path: s.browser.chromium_path,
                proxy: s.browser.proxy,
            },
            crawl: CrawlConfig {
                tab_timeout_secs: s.crawl.tab_timeout_secs,
                wait_js_exec_time_secs: s.crawl.wait_js_exec_time_secs,
                crawl_total_time_secs: s.crawl.crawl_total_time_secs,
                tab_concurrency: s.crawl.tab_concurrency,
                max_requests: s.crawl.max_requests,
                seed_from_robots_sitemap: s.crawl.seed_from_robots_sitemap,
            },
            output: OutputConfig {
                output_path: s.output.output_path,
            },
            logging: LoggingConfig {
                log_level: s.logging.log_level,
                quiet: s.logging.quiet,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Cookie normalization
// ---------------------------------------------------------------------------

/// Splits a raw `Cookie` header value on `;`, trims each `k=v` pair, drops empty
/// pairs, and rejoins as `"k=v; k=v"`. Returns `None` for an empty/blank input.
#[must_use]
pub fn normalize_cookie_header(raw: &str) -> Option<String> {
    let pairs: Vec<&str> = raw
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Inputs layered over config-file values, per CLI-overrides-file-overrides-defaults.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub ua: Option<String>,
    pub cookie: Option<String>,
    pub gui: Option<bool>,
    pub chromium_path: Option<String>,
    pub proxy: Option<String>,
    pub tab_timeout_secs: Option<u64>,
    pub wait_js_exec_time_secs: Option<u64>,
    pub crawl_total_time_secs: Option<u64>,
    pub tab_concurrency: Option<usize>,
    pub max_requests: Option<usize>,
    pub seed_from_robots_sitemap: Option<bool>,
    pub output_path: Option<String>,
    pub log_level: Option<String>,
    pub quiet: Option<bool>,
}

/// Resolves a config file plus CLI overrides into a fully-populated `ResolvedConfig`.
#[must_use]
pub fn resolve_config(
    file: &ConfigFile,
    overrides: &CliOverrides,
    config_path: Option<PathBuf>,
) -> ResolvedConfig {
    let cookie_raw = overrides
        .cookie
        .clone()
        .or_else(|| file.browser.cookie.clone());

    ResolvedConfig {
        config_path,
        ua: overrides
            .ua
            .clone()
            .or_else(|| file.browser.ua.clone())
            .unwrap_or_else(|| DEFAULT_UA.to_string()),
        cookie_header: cookie_raw.and_then(|c| normalize_cookie_header(&c)),
        gui: overrides.gui.or(file.browser.gui).unwrap_or(false),
        chromium_path: overrides
            .chromium_path
            .clone()
            .or_else(|| file.browser.chromium_path.clone()),
        proxy: overrides.proxy.clone().or_else(|| file.browser.proxy.clone()),
        tab_timeout: Duration::from_secs(
            overrides
                .tab_timeout_secs
                .or(file.crawl.tab_timeout_secs)
                .unwrap_or(DEFAULT_TAB_TIMEOUT_SECS),
        ),
        wait_js_exec_time: Duration::from_secs(
            overrides
                .wait_js_exec_time_secs
                .or(file.crawl.wait_js_exec_time_secs)
                .unwrap_or(DEFAULT_WAIT_JS_EXEC_TIME_SECS),
        ),
        crawl_total_time: Duration::from_secs(
            overrides
                .crawl_total_time_secs
                .or(file.crawl.crawl_total_time_secs)
                .unwrap_or(DEFAULT_CRAWL_TOTAL_TIME_SECS),
        ),
        tab_concurrency: overrides
            .tab_concurrency
            .or(file.crawl.tab_concurrency)
            .unwrap_or(DEFAULT_TAB_CONCURRENCY)
            .max(1),
        max_requests: overrides
            .max_requests
            .or(file.crawl.max_requests)
            .unwrap_or(DEFAULT_MAX_REQUESTS),
        seed_from_robots_sitemap: overrides
            .seed_from_robots_sitemap
            .or(file.crawl.seed_from_robots_sitemap)
            .unwrap_or(false),
        output_path: PathBuf::from(
            overrides
                .output_path
                .clone()
                .or_else(|| file.output.output_path.clone())
                .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
        ),
        log_level: overrides
            .log_level
            .clone()
            .or_else(|| file.logging.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        quiet: overrides.quiet.or(file.logging.quiet).unwrap_or(false),
    }
}

// ---------------------------------------------------------------------------
// Config init
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns `ConfigError::NoConfigDir` if the platform config directory cannot be determined.
pub fn default_init_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join("flamingo-crawler").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// # Errors
///
/// - `ConfigError::AlreadyExists` if the file already exists
/// - `ConfigError::Io` on I/O failure
/// - `ConfigError::NoConfigDir` if no target path and platform config dir unknown
pub fn init_config(target_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match target_path {
        Some(p) => p.to_path_buf(),
        None => default_init_path()?,
    };

    init_config_to(&path)
}

/// # Errors
///
/// - `ConfigError::AlreadyExists` if the file already exists
/// - `ConfigError::Io` on I/O failure
pub fn init_config_to(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_full_toml_config() {
        let toml = r#"
[browser]
ua = "custom-agent"
cookie = "a=1; b=2"
gui = true
chromium_path = "/usr/bin/chromium"

[crawl]
tab_timeout_secs = 60
tab_concurrency = 5

[output]
output_path = "out.json"

[logging]
log_level = "debug"
quiet = true
"#;
        let config = parse_config(toml, Path::new("test.toml"));
        assert_eq!(config.browser.ua.as_deref(), Some("custom-agent"));
        assert_eq!(config.crawl.tab_concurrency, Some(5));
        assert_eq!(config.output.output_path.as_deref(), Some("out.json"));
        assert_eq!(config.logging.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn parse_valid_yaml_config() {
        let yaml = "browser:\n  ua: yaml-agent\ncrawl:\n  tab_concurrency: 7\n";
        let config = parse_config(yaml, Path::new("test.yaml"));
        assert_eq!(config.browser.ua.as_deref(), Some("yaml-agent"));
        assert_eq!(config.crawl.tab_concurrency, Some(7));
    }

    #[test]
    fn parse_invalid_toml_returns_default() {
        let config = parse_config("not valid [[[", Path::new("test.toml"));
        assert!(config.browser.ua.is_none());
    }

    #[test]
    fn parse_unknown_keys_warns_but_keeps_known() {
        let toml = "[browser]\nua = \"x\"\nbogus = 1\n";
        let config = parse_config(toml, Path::new("test.toml"));
        assert_eq!(config.browser.ua.as_deref(), Some("x"));
    }

    #[test]
    fn normalize_cookie_header_trims_and_rejoins() {
        assert_eq!(
            normalize_cookie_header(" a=1 ;b=2;  c=3 "),
            Some("a=1; b=2; c=3".to_string())
        );
    }

    #[test]
    fn normalize_cookie_header_drops_empty_pairs() {
        assert_eq!(normalize_cookie_header("a=1;; b=2"), Some("a=1; b=2".to_string()));
    }

    #[test]
    fn normalize_cookie_header_blank_is_none() {
        assert_eq!(normalize_cookie_header(""), None);
        assert_eq!(normalize_cookie_header("   "), None);
    }

    #[test]
    fn resolve_defaults() {
        let resolved = resolve_config(&ConfigFile::default(), &CliOverrides::default(), None);
        assert_eq!(resolved.ua, "flamingo");
        assert_eq!(resolved.tab_concurrency, DEFAULT_TAB_CONCURRENCY);
        assert_eq!(resolved.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(resolved.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(resolved.log_level, "info");
        assert!(!resolved.quiet);
        assert!(resolved.cookie_header.is_none());
    }

    #[test]
    fn resolve_cli_overrides_take_priority_over_file() {
        let file = ConfigFile {
            browser: BrowserConfig {
                ua: Some("file-agent".into()),
                ..BrowserConfig::default()
            },
            ..ConfigFile::default()
        };
        let overrides = CliOverrides {
            ua: Some("cli-agent".into()),
            ..CliOverrides::default()
        };
        let resolved = resolve_config(&file, &overrides, None);
        assert_eq!(resolved.ua, "cli-agent");
    }

    #[test]
    fn resolve_tab_concurrency_floors_at_one() {
        let overrides = CliOverrides {
            tab_concurrency: Some(0),
            ..CliOverrides::default()
        };
        let resolved = resolve_config(&ConfigFile::default(), &overrides, None);
        assert_eq!(resolved.tab_concurrency, 1);
    }

    #[test]
    fn init_config_creates_file() {
        let dir = std::env::temp_dir().join("flamingo-crawler-test-config-init");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.toml");

        let result = init_config_to(&path);
        assert!(result.is_ok());
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn init_config_refuses_overwrite() {
        let dir = std::env::temp_dir().join("flamingo-crawler-test-config-overwrite");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "existing").unwrap();

        let result = init_config_to(&path);
        assert!(matches!(result, Err(ConfigError::AlreadyExists(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn find_config_with_explicit_path() {
        let dir = std::env::temp_dir().join("flamingo-crawler-test-find-explicit");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("my-config.toml");
        std::fs::write(&path, "").unwrap();

        let found = find_config_file_with(Some(&path), None);
        assert_eq!(found, Some(path.clone()));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
