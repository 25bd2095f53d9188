//! robots.txt / sitemap.xml seed-URL discovery (component K).
//!
//! Grounded on `seed.go`'s `fetchSeedUrls`/`parseRobotsTxt`/`parseSitemapXml`. Every
//! fetch here is best-effort: a failure on any one source yields an empty list for
//! that source, never a crawl-level error.

use url::Url;

fn fetch(agent: &ureq::Agent, url: &str) -> Option<String> {
    let mut response = agent.get(url).call().ok()?;
    response.body_mut().read_to_string().ok()
}

/// Collects seed URLs from `robots.txt` and any `sitemap.xml` reachable from the
/// entrance host, tagged into the frontier as `source = seed` by the caller.
///
/// `agent` is the process-wide blocking HTTP client (§5 of the design document
/// requires one shared client for both redirect-link extraction and seed
/// collection); this function is itself blocking and must be called from a
/// `tokio::task::spawn_blocking` context, never directly on an async task.
#[must_use]
pub fn collect_seed_urls(agent: &ureq::Agent, entrance: &str) -> Vec<String> {
    let Ok(entrance_url) = Url::parse(entrance) else {
        return Vec::new();
    };
    let Some(host) = entrance_url.host_str() else {
        return Vec::new();
    };
    let origin = format!("{}://{host}", entrance_url.scheme());

    let mut urls = Vec::new();
    let mut sitemap_urls = vec![format!("{origin}/sitemap.xml")];

    if let Some(robots_body) = fetch(agent, &format!("{origin}/robots.txt")) {
        let (paths, sitemaps) = parse_robots_txt(&robots_body);
        for path in paths {
            urls.push(format!("{origin}{path}"));
        }
        sitemap_urls.extend(sitemaps);
    }

    for sitemap_url in sitemap_urls {
        if let Some(body) = fetch(agent, &sitemap_url) {
            urls.extend(parse_sitemap_xml(&body));
        }
    }

    urls
}

/// Extracts `Allow`/`Disallow` path values (skipping bare `/` and wildcard paths)
/// and any `Sitemap:` URLs from a `robots.txt` body.
fn parse_robots_txt(body: &str) -> (Vec<String>, Vec<String>) {
    let mut paths = Vec::new();
    let mut sitemaps = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if let Some(rest) = strip_directive(line, "sitemap:") {
            sitemaps.push(rest.to_string());
            continue;
        }
        let path = strip_directive(line, "allow:").or_else(|| strip_directive(line, "disallow:"));
        if let Some(path) = path {
            if path.is_empty() || path == "/" || path.contains('*') {
                continue;
            }
            paths.push(path.to_string());
        }
    }

    (paths, sitemaps)
}

fn strip_directive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() < prefix.len() || !line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(line[prefix.len()..].trim())
}

/// Extracts `<url><loc>…</loc></url>` entries from a sitemap body. Parses with a
/// permissive substring scan rather than a full XML parser, mirroring the Go
/// source's lightweight `encoding/xml` unmarshal of only the `loc` field.
fn parse_sitemap_xml(body: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<loc>") {
        let after_start = &rest[start + "<loc>".len()..];
        let Some(end) = after_start.find("</loc>") else {
            break;
        };
        urls.push(after_start[..end].trim().to_string());
        rest = &after_start[end + "</loc>".len()..];
    }
    urls
}
