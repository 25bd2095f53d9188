//! Request store, frontier, and visited-set (component B).

use std::collections::HashSet;
use std::sync::RwLock;

use crate::canon::{self, CanonError};
use crate::model::{Method, Request};

/// Default bound on distinct stored requests.
pub const DEFAULT_MAX_REQUESTS: usize = 100_000;

/// Thread-safe set + insertion-ordered list over [`Request`]s, keyed by `method || url`.
pub struct RequestStore {
    entrance: String,
    max_requests: usize,
    inner: RwLock<RequestStoreInner>,
}

struct RequestStoreInner {
    keys: HashSet<String>,
    ordered: Vec<Request>,
    bound_warned: bool,
}

impl RequestStore {
    #[must_use]
    pub fn new(entrance: impl Into<String>, max_requests: usize) -> Self {
        Self {
            entrance: entrance.into(),
            max_requests,
            inner: RwLock::new(RequestStoreInner {
                keys: HashSet::new(),
                ordered: Vec::new(),
                bound_warned: false,
            }),
        }
    }

    /// Canonicalizes `req.url`, applies the in-scope filter, and inserts it if it is
    /// a first sighting. Returns `true` iff this call performed the first insertion.
    pub fn save(&self, mut req: Request) -> bool {
        let Ok(canonical) = canon::canonicalize(&req.url) else {
            return false;
        };
        req.url = canonical;

        if !canon::in_scope(&req.url, &self.entrance) {
            return false;
        }

        let key = req.key();

        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        if inner.ordered.len() >= self.max_requests {
            if !inner.bound_warned {
                tracing::warn!(max_requests = self.max_requests, "request store bound reached, dropping further saves");
                inner.bound_warned = true;
            }
            return false;
        }

        if !inner.keys.insert(key) {
            return false;
        }

        inner.ordered.push(req);
        true
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Request> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.ordered.clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.ordered.len()
    }
}

/// In-memory FIFO of GET requests pending navigation. Overflow is dropped.
pub struct Frontier {
    sender: tokio::sync::mpsc::Sender<Request>,
    receiver: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Request>>,
}

impl Frontier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Attempts to enqueue `req`. Silently drops on a full channel, matching the
    /// design's drop-on-full backpressure policy for the frontier.
    pub fn try_push(&self, req: Request) -> bool {
        self.sender.try_send(req).is_ok()
    }

    pub async fn pop(&self) -> Option<Request> {
        let mut rx = self.receiver.lock().await;
        rx.recv().await
    }

    #[must_use]
    pub fn sender(&self) -> tokio::sync::mpsc::Sender<Request> {
        self.sender.clone()
    }

    /// Approximate number of requests currently queued, derived from the
    /// sender's outstanding permits rather than locking the receiver.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tracks which `method || url` keys have already been *enqueued*, independent of
/// whether they were ever stored, to prevent duplicate frontier inserts.
#[derive(Default)]
pub struct VisitedSet {
    inner: RwLock<HashSet<String>>,
}

impl VisitedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` visited; returns `true` if it was not previously visited.
    pub fn mark(&self, key: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.insert(key.to_string())
    }

    #[must_use]
    pub fn is_visited(&self, key: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.contains(key)
    }
}

/// Offers `req` to the store and, for first-insertion GET requests not already
/// enqueued, pushes it onto the frontier. This is the single funnel both CDP
/// event handlers and in-page script callbacks go through (§3/§9 of the design).
///
/// Canonicalizes `req.url` up front so the copy pushed onto the frontier (and the
/// key marked visited) matches what `save` actually dedups and stores — otherwise
/// a tab would navigate to the raw, pre-canonicalization URL.
pub fn offer(store: &RequestStore, frontier: &Frontier, visited: &VisitedSet, mut req: Request) -> bool {
    let Ok(canonical) = canon::canonicalize(&req.url) else {
        return false;
    };
    req.url = canonical;

    let method = req.method;
    let key = req.key();
    let inserted = store.save(req.clone());

    if inserted && method == Method::Get && visited.mark(&key) {
        frontier.try_push(req);
    }

    inserted
}
