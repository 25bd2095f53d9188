use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HTTP method of a discovered request. The crawler only ever issues GET (navigation)
/// and records POST (form submissions); every other verb is folded into these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("POST") {
            Self::Post
        } else {
            Self::Get
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed set of discovery mechanisms. Diagnostic only — never affects dedup or scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Entrance,
    Seed,
    Navigation,
    Open,
    Xhr,
    Fetch,
    Dom,
    Comment,
    Href,
    Redirect,
    Form,
    Json,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entrance => "entrance",
            Self::Seed => "seed",
            Self::Navigation => "navigation",
            Self::Open => "open",
            Self::Xhr => "xhr",
            Self::Fetch => "fetch",
            Self::Dom => "dom",
            Self::Comment => "comment",
            Self::Href => "href",
            Self::Redirect => "redirect",
            Self::Form => "form",
            Self::Json => "json",
        }
    }

    /// Parses the source tag carried by in-page script payloads (`sendLink` bindings).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "seed" => Self::Seed,
            "navigation" => Self::Navigation,
            "open" => Self::Open,
            "xhr" | "XHR" => Self::Xhr,
            "fetch" => Self::Fetch,
            "DOM" | "dom" => Self::Dom,
            "comment" => Self::Comment,
            "href" => Self::Href,
            "redirect" => Self::Redirect,
            "form" => Self::Form,
            "json" => Self::Json,
            _ => Self::Entrance,
        }
    }
}

/// The unit of discovery and output: one concrete HTTP request the target application
/// actually performs when exercised through the browser.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub source: Source,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, source: Source) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            source,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Dedup key: `method || url`, matching the Go source's `"METHOD" + url` convention.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{}", self.method.as_str(), self.url)
    }
}

/// Wire shape written to the output JSON file (§6 of the design document).
#[derive(Debug, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub data: String,
    pub source: String,
}

impl From<&Request> for RequestRecord {
    fn from(req: &Request) -> Self {
        use base64::Engine;
        Self {
            method: req.method.as_str().to_string(),
            url: req.url.clone(),
            headers: req.headers.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&req.body),
            source: req.source.as_str().to_string(),
        }
    }
}
