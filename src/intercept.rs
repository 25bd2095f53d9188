//! The request-interception classification table (part of component D).
//!
//! Kept as a separate, purely-functional module so the policy table in
//! [`classify_request`] can be unit-tested without a live CDP session.

use crate::model::{Method, Source};

/// Resource types whose requests are blocked outright. A blocked request is only
/// ever recorded (as a `dom`-sourced GET) if its URL carries a non-empty query —
/// mirroring the idea that a blocked asset URL with query parameters may still be
/// an interesting, attacker-controllable endpoint even though the crawler will
/// never let the asset itself load.
const BLOCKED_RESOURCE_TYPES: &[&str] = &[
    "Image",
    "Media",
    "Font",
    "TextTrack",
    "Prefetch",
    "Manifest",
    "SignedExchange",
    "Ping",
    "CSPViolationReport",
    "Preflight",
    "Other",
    "SourceMap",
    "WebBundle",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptAction {
    /// `Fetch.failRequest` with `aborted`. `record` is `Some(source)` iff the
    /// request should still be offered to the store despite never reaching the
    /// network.
    FailAborted { record: Option<Source> },
    /// `Fetch.continueRequest`, no store offer.
    Continue,
    /// `Fetch.continueRequest`, and offer to the store under `source`.
    ContinueAndRecord { source: Source },
}

/// Classifies one `Fetch.requestPaused` event per the policy table: resource type
/// first, then the logout filter, then the top-frame-navigation comparison for
/// everything else. No row is reachable during a `continue` that lands a live
/// network call unless the table says so explicitly.
#[must_use]
pub fn classify_request(
    resource_type: &str,
    url: &str,
    method: Method,
    frame_id: &str,
    top_frame_id: &str,
    navigating_url: &str,
) -> InterceptAction {
    if BLOCKED_RESOURCE_TYPES.contains(&resource_type) {
        let has_query = url.split_once('?').is_some_and(|(_, q)| !q.is_empty());
        return InterceptAction::FailAborted {
            record: has_query.then_some(Source::Dom),
        };
    }

    if crate::canon::is_logout_url(url) {
        return InterceptAction::FailAborted { record: None };
    }

    if matches!(resource_type, "Stylesheet" | "Script") {
        return InterceptAction::Continue;
    }

    if matches!(resource_type, "XHR" | "Fetch") {
        let source = if resource_type == "XHR" {
            Source::Xhr
        } else {
            Source::Fetch
        };
        return InterceptAction::ContinueAndRecord { source };
    }

    if frame_id != top_frame_id {
        return InterceptAction::Continue;
    }

    if url == navigating_url && method == Method::Get {
        return InterceptAction::Continue;
    }

    InterceptAction::FailAborted {
        record: Some(Source::Navigation),
    }
}
