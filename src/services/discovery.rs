//! Discovery (C2): finds a domain's URLs via sitemap(s), falling back to a
//! breadth-first crawl. Mirrors §4.2.

use crate::models::DiscoveredUrl;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};

const SITEMAP_CANDIDATES: &[&str] =
    &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml", "/wp-sitemap.xml"];
const MAX_SITEMAP_FANOUT: usize = 10;
const CRAWL_DEPTH: u32 = 2;

pub struct DiscoveryService {
    http: Client,
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryService {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build discovery HTTP client");
        Self { http }
    }

    /// Discover up to `max_urls` pages for `hostname`, trying sitemap sources
    /// in order and stopping at the first that yields at least one URL,
    /// before falling back to a same-domain crawl (§4.2).
    pub async fn discover(
        &self,
        hostname: &str,
        scheme: &str,
        max_urls: usize,
    ) -> Vec<DiscoveredUrl> {
        for candidate in SITEMAP_CANDIDATES {
            let url = format!("{scheme}://{hostname}{candidate}");
            match self.fetch_sitemap_tree(&url, 0).await {
                Ok(urls) if !urls.is_empty() => {
                    return self.to_discovered(urls, hostname, max_urls);
                },
                Ok(_) => continue,
                Err(e) => {
                    debug!("sitemap candidate {} failed: {}", url, e);
                    continue;
                },
            }
        }

        match self.crawl(hostname, scheme, max_urls).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("crawl fallback failed for {}: {}", hostname, e);
                Vec::new()
            },
        }
    }

    async fn fetch_sitemap_tree(
        &self,
        url: &str,
        depth: usize,
    ) -> Result<Vec<String>, anyhow::Error> {
        let body = self.http.get(url).send().await?.error_for_status()?.text().await?;
        let (is_index, locs) = parse_sitemap_locs(&body)?;

        if !is_index {
            return Ok(locs);
        }
        if depth >= 1 {
            return Ok(Vec::new());
        }

        let mut urls = Vec::new();
        for child_url in locs.into_iter().take(MAX_SITEMAP_FANOUT) {
            match Box::pin(self.fetch_sitemap_tree(&child_url, depth + 1)).await {
                Ok(child_urls) => urls.extend(child_urls),
                Err(e) => debug!("child sitemap {} failed: {}", child_url, e),
            }
        }
        Ok(urls)
    }

    async fn crawl(
        &self,
        hostname: &str,
        scheme: &str,
        max_urls: usize,
    ) -> Result<Vec<DiscoveredUrl>, anyhow::Error> {
        let base_host = strip_www(hostname);
        let homepage = format!("{scheme}://{hostname}/");

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut discovered = Vec::new();
        queue.push_back((homepage.clone(), 0u32));
        seen.insert(normalize(&homepage));

        while let Some((url, depth)) = queue.pop_front() {
            if discovered.len() >= max_urls {
                break;
            }

            let html = match self.http.get(&url).send().await {
                Ok(resp) => resp.text().await.unwrap_or_default(),
                Err(e) => {
                    debug!("crawl fetch {} failed: {}", url, e);
                    continue;
                },
            };

            discovered.push(classify(&url, base_host));

            if depth >= CRAWL_DEPTH {
                continue;
            }

            let fragment = scraper::Html::parse_document(&html);
            let selector = scraper::Selector::parse("a[href]").unwrap();
            for el in fragment.select(&selector) {
                let Some(href) = el.value().attr("href") else { continue };
                let Ok(joined) = reqwest::Url::parse(&url).and_then(|base| base.join(href)) else {
                    continue;
                };
                if joined.scheme() != "http" && joined.scheme() != "https" {
                    continue;
                }
                let joined_host = joined.host_str().unwrap_or_default();
                if strip_www(joined_host) != base_host {
                    continue;
                }

                let mut clean = joined.clone();
                clean.set_fragment(None);
                clean.set_query(None);
                let key = normalize(clean.as_str());
                if seen.insert(key) {
                    queue.push_back((clean.to_string(), depth + 1));
                }
            }
        }

        Ok(discovered)
    }

    fn to_discovered(
        &self,
        urls: Vec<String>,
        hostname: &str,
        max_urls: usize,
    ) -> Vec<DiscoveredUrl> {
        let base_host = strip_www(hostname);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for url in urls {
            if out.len() >= max_urls {
                break;
            }
            let key = normalize(&url);
            if !seen.insert(key) {
                continue;
            }
            out.push(classify(&url, base_host));
        }
        out
    }
}

/// Returns `(is_sitemap_index, locs)`. A bare parse error propagates to the
/// caller, who treats it as "this source yielded nothing" and moves on.
fn parse_sitemap_locs(xml: &str) -> Result<(bool, Vec<String>), anyhow::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut is_index = false;
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"sitemapindex" {
                    is_index = true;
                } else if name == b"loc" {
                    in_loc = true;
                }
            },
            Event::Text(t) if in_loc => {
                locs.push(t.unescape()?.into_owned());
                in_loc = false;
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    Ok((is_index, locs))
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_lowercase()
}

fn classify(url: &str, base_host: &str) -> DiscoveredUrl {
    let parsed = reqwest::Url::parse(url).ok();
    let host = parsed.as_ref().and_then(|u| u.host_str()).unwrap_or_default().to_string();
    let path = parsed.as_ref().map(|u| u.path().to_string()).unwrap_or_else(|| "/".to_string());
    let stripped = strip_www(&host);
    let is_subdomain = stripped != base_host;
    let subdomain_label = if is_subdomain {
        stripped.strip_suffix(&format!(".{base_host}")).map(|s| s.to_string())
    } else {
        None
    };

    DiscoveredUrl {
        url: url.to_string(),
        path: path.clone(),
        is_subdomain,
        subdomain_label,
        initial_depth_estimate: DiscoveredUrl::depth_from_path(&path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_subdomain() {
        let d = classify("https://blog.example.com/post", "example.com");
        assert!(d.is_subdomain);
        assert_eq!(d.subdomain_label.as_deref(), Some("blog"));
        assert_eq!(d.initial_depth_estimate, 1);
    }

    #[test]
    fn classify_www_equals_bare_host() {
        let d = classify("https://www.example.com/about", "example.com");
        assert!(!d.is_subdomain);
        assert_eq!(d.initial_depth_estimate, 1);
    }

    #[test]
    fn classify_root_depth_zero() {
        let d = classify("https://example.com/", "example.com");
        assert_eq!(d.initial_depth_estimate, 0);
    }

    #[test]
    fn parse_urlset_extracts_locs() {
        let xml = r#"<?xml version="1.0"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://example.com/</loc></url>
          <url><loc>https://example.com/about</loc></url>
        </urlset>"#;
        let (is_index, locs) = parse_sitemap_locs(xml).unwrap();
        assert!(!is_index);
        assert_eq!(locs, vec!["https://example.com/", "https://example.com/about"]);
    }

    #[test]
    fn parse_sitemapindex_flags_index() {
        let xml = r#"<sitemapindex><sitemap><loc>https://example.com/s1.xml</loc></sitemap></sitemapindex>"#;
        let (is_index, locs) = parse_sitemap_locs(xml).unwrap();
        assert!(is_index);
        assert_eq!(locs, vec!["https://example.com/s1.xml"]);
    }
}
