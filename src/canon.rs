//! URL canonicalizer and request filter (component A).

use url::Url;

/// Path extensions a request may carry to stay in-scope (case-insensitive).
const EXTENSION_WHITELIST: &[&str] = &["php", "asp", "jsp", "html", "htm"];

/// Extra logout-adjacent keywords folded in from the original Go `config/internal.go`
/// (spec.md names only "logout"; "quit"/"exit" only enlarge what gets filtered).
const LOGOUT_KEYWORDS: &[&str] = &["logout", "quit", "exit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonError {
    NotHttp,
    Unparseable,
}

impl std::fmt::Display for CanonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotHttp => write!(f, "URL scheme is not http/https"),
            Self::Unparseable => write!(f, "URL could not be parsed"),
        }
    }
}

/// Normalizes a raw URL string: lowercases scheme/host, strips default ports,
/// drops the fragment, resolves `.`/`..` path segments, and sorts query keys.
///
/// # Errors
///
/// Returns [`CanonError::NotHttp`] for non-`http(s)` schemes and
/// [`CanonError::Unparseable`] if the URL does not parse at all.
pub fn canonicalize(raw: &str) -> Result<String, CanonError> {
    let mut url = Url::parse(raw).map_err(|_| CanonError::Unparseable)?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(CanonError::NotHttp),
    }

    url.set_fragment(None);

    // The `url` crate already lowercases scheme and host and resolves dot-segments
    // during parsing; `set_port` here only needs to strip the *default* port, since
    // a non-default explicit port must be preserved.
    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        let _ = url.set_port(None);
    }

    if url.path().is_empty() {
        url.set_path("/");
    }

    sort_query(&mut url);

    Ok(url.into())
}

fn sort_query(url: &mut Url) {
    let Some(query) = url.query() else { return };
    if query.is_empty() {
        return;
    }
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    url.query_pairs_mut().clear().extend_pairs(&pairs);
}

/// True iff `url` shares scheme+host with `entrance`, is not a logout URL, and
/// either has no path extension or one from [`EXTENSION_WHITELIST`].
#[must_use]
pub fn in_scope(url: &str, entrance: &str) -> bool {
    if !url.starts_with("http") {
        return false;
    }
    let (Ok(parsed), Ok(entrance_parsed)) = (Url::parse(url), Url::parse(entrance)) else {
        return false;
    };

    if parsed.scheme() != entrance_parsed.scheme() || parsed.host_str() != entrance_parsed.host_str() {
        return false;
    }

    if is_logout_url(url) {
        return false;
    }

    has_whitelisted_extension(parsed.path())
}

/// True iff the lowercased URL contains any logout-adjacent keyword.
#[must_use]
pub fn is_logout_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    LOGOUT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_whitelisted_extension(path: &str) -> bool {
    match path.rfind('.') {
        None => true,
        Some(idx) => {
            let ext = path[idx + 1..].to_lowercase();
            EXTENSION_WHITELIST.contains(&ext.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert_eq!(
            canonicalize("javascript:alert(1)"),
            Err(CanonError::NotHttp)
        );
        assert_eq!(canonicalize("ftp://x.test/a"), Err(CanonError::NotHttp));
    }

    #[test]
    fn strips_default_ports() {
        assert_eq!(
            canonicalize("http://X.test:80/a").unwrap(),
            "http://x.test/a"
        );
        assert_eq!(
            canonicalize("https://x.test:443/a").unwrap(),
            "https://x.test/a"
        );
    }

    #[test]
    fn preserves_nondefault_port() {
        assert_eq!(
            canonicalize("http://x.test:8080/a").unwrap(),
            "http://x.test:8080/a"
        );
    }

    #[test]
    fn drops_fragment() {
        let a = canonicalize("http://x.test/a#section1").unwrap();
        let b = canonicalize("http://x.test/a#section2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "http://x.test/a");
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(
            canonicalize("http://x.test/a/../b/./c").unwrap(),
            "http://x.test/b/c"
        );
    }

    #[test]
    fn empty_path_becomes_slash() {
        assert_eq!(canonicalize("http://x.test").unwrap(), "http://x.test/");
    }

    #[test]
    fn sorts_query_keys() {
        let a = canonicalize("http://x.test/a?b=2&a=1").unwrap();
        let b = canonicalize("http://x.test/a?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize("http://X.test:80/a/../b?z=1&a=2#frag").unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn in_scope_rejects_cross_origin() {
        assert!(!in_scope("http://other.test/b", "http://x.test/index.html"));
    }

    #[test]
    fn in_scope_rejects_logout() {
        assert!(!in_scope(
            "http://x.test/logout.php",
            "http://x.test/index.html"
        ));
    }

    #[test]
    fn in_scope_accepts_whitelisted_extension() {
        assert!(in_scope("http://x.test/a.php", "http://x.test/index.html"));
    }

    #[test]
    fn in_scope_rejects_other_extension() {
        assert!(!in_scope("http://x.test/a.png", "http://x.test/index.html"));
    }

    #[test]
    fn in_scope_accepts_extensionless() {
        assert!(in_scope("http://x.test/api?q=1", "http://x.test/index.html"));
    }

    #[test]
    fn in_scope_rejects_non_http() {
        assert!(!in_scope("javascript:void(0)", "http://x.test/index.html"));
    }

    #[test]
    fn in_scope_rejects_path_info_after_extension() {
        // The rightmost `.` is in an earlier segment (`index.php`), not the final
        // segment (`2`); the whitelist test must look at the full path, not just
        // the last path segment.
        assert!(!in_scope(
            "http://x.test/index.php/page/2",
            "http://x.test/index.html"
        ));
    }
}
