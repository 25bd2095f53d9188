use std::fmt;

use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConnectionError = 2,
    TargetError = 3,
    TimeoutError = 4,
    ProtocolError = 5,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::GeneralError => write!(f, "general error"),
            Self::ConnectionError => write!(f, "connection error"),
            Self::TargetError => write!(f, "target error"),
            Self::TimeoutError => write!(f, "timeout error"),
            Self::ProtocolError => write!(f, "protocol error"),
        }
    }
}

/// Top-level application error, printed as structured JSON to stderr.
#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub code: ExitCode,
    pub custom_json: Option<serde_json::Value>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    #[must_use]
    pub fn new(message: impl Into<String>, code: ExitCode) -> Self {
        Self {
            message: message.into(),
            code,
            custom_json: None,
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::GeneralError)
    }

    #[must_use]
    pub fn no_chrome_found() -> Self {
        Self::new(
            "could not find a Chrome/Chromium executable; pass --chromium-path",
            ExitCode::GeneralError,
        )
    }

    #[must_use]
    pub fn invalid_entrance_url(url: &str) -> Self {
        Self::new(
            format!("entrance URL must start with http:// or https://: {url}"),
            ExitCode::GeneralError,
        )
    }

    pub fn to_json(&self) -> String {
        if let Some(custom) = &self.custom_json {
            return custom.to_string();
        }
        let output = ErrorOutput {
            error: &self.message,
            code: self.code as u8,
        };
        serde_json::to_string(&output).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","code":{}}}"#,
                self.message, self.code as u8
            )
        })
    }

    pub fn print_json_stderr(&self) {
        eprintln!("{}", self.to_json());
    }
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    code: u8,
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::config(e.to_string())
    }
}

/// Error taxonomy for crawl-time failures (navigation, CDP, retry classification).
///
/// `NavigationAborted` is the expected shape of every interception-driven abort
/// and must never be logged as a real failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlErrorKind {
    NavigationAborted,
    Timeout,
    Network,
    Canceled,
    CdpProtocol,
    TabPanic,
    Other,
}

impl CrawlErrorKind {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Network)
    }
}

#[derive(Debug)]
pub struct CrawlError {
    pub kind: CrawlErrorKind,
    pub message: String,
    pub url: Option<String>,
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{:?} error on {url}: {}", self.kind, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CrawlError {}

impl CrawlError {
    #[must_use]
    pub fn new(kind: CrawlErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
