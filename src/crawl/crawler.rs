//! Same-domain crawl of a site's landing page and the pages it links to.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use url::Url;

use super::fetcher::{PageFetcher, RawPage};
use crate::core::config::CrawlConfig;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    Follow(Url),
    /// `#section` or `/#section`: an anchor on the landing page itself.
    Fragment,
    External,
    /// Landing page or an already scheduled URL.
    Duplicate,
    /// `mailto:`, `tel:`, `javascript:` and anything unparsable.
    Unsupported,
}

/// Decides whether `href`, found on the landing page `seed`, is crawled.
pub fn classify_link(seed: &Url, href: &str) -> LinkDecision {
    let href = href.trim();
    if href.starts_with('#') || href.starts_with("/#") {
        return LinkDecision::Fragment;
    }

    let Ok(mut resolved) = seed.join(href) else {
        return LinkDecision::Unsupported;
    };
    if !matches!(resolved.scheme(), "http" | "https") {
        return LinkDecision::Unsupported;
    }
    if resolved.host_str() != seed.host_str() {
        return LinkDecision::External;
    }

    resolved.set_fragment(None);
    let mut landing = seed.clone();
    landing.set_fragment(None);
    if same_page(&resolved, &landing) {
        return LinkDecision::Duplicate;
    }
    LinkDecision::Follow(resolved)
}

fn same_page(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
        && left.path().trim_end_matches('/') == right.path().trim_end_matches('/')
        && non_empty_query(left) == non_empty_query(right)
}

fn non_empty_query(url: &Url) -> Option<&str> {
    url.query().filter(|q| !q.is_empty())
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Landing page first, then linked pages in link order.
    pub pages: Vec<RawPage>,
    pub skipped_external: Vec<String>,
    pub skipped_fragment: Vec<String>,
    pub skipped_other: Vec<String>,
    pub failures: Vec<(String, String)>,
}

pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CrawlConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetches `seed` and every same-domain page it links to.
    ///
    /// Linked pages are fetched independently of each other, so a failed fetch is
    /// logged and skipped without affecting the rest. Only a failure on the landing
    /// page itself is returned as an error.
    pub async fn crawl(&self, seed: &Url) -> Result<CrawlReport, ApiError> {
        let landing = self.fetcher.fetch(seed.as_str()).await?;
        // Links are resolved against where the seed actually landed.
        let base = match Url::parse(&landing.url) {
            Ok(final_url) if final_url != *seed => {
                tracing::info!(seed = %seed, landed = %final_url, "Landing page redirected");
                final_url
            }
            _ => seed.clone(),
        };
        let hrefs = self.fetcher.enumerate_links(&landing.html, base.as_str());
        tracing::info!(url = %base, links = hrefs.len(), "Fetched landing page");

        let mut report = CrawlReport::default();
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut targets = Vec::new();

        for href in hrefs {
            match classify_link(&base, &href) {
                LinkDecision::Follow(url) => {
                    if targets.len() >= self.config.max_links {
                        tracing::warn!(max_links = self.config.max_links, href = %href, "Link limit reached, skipping");
                        report.skipped_other.push(href);
                        continue;
                    }
                    if scheduled.insert(url.to_string()) {
                        targets.push(url);
                    }
                }
                LinkDecision::External => {
                    tracing::info!(href = %href, "Skipping external link");
                    report.skipped_external.push(href);
                }
                LinkDecision::Fragment => {
                    tracing::info!(href = %href, "Skipping in-page section link");
                    report.skipped_fragment.push(href);
                }
                LinkDecision::Duplicate => {}
                LinkDecision::Unsupported => {
                    tracing::debug!(href = %href, "Skipping unsupported link");
                    report.skipped_other.push(href);
                }
            }
        }
        report.pages.push(landing);

        let fetcher = Arc::clone(&self.fetcher);
        let results: Vec<(Url, Result<RawPage, ApiError>)> = stream::iter(targets)
            .map(|url| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    tracing::debug!(url = %url, "Fetching linked page");
                    let result = fetcher.fetch(url.as_str()).await;
                    (url, result)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (url, result) in results {
            match result {
                Ok(page) => report.pages.push(page),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "Failed to fetch linked page");
                    report.failures.push((url.to_string(), err.to_string()));
                }
            }
        }

        tracing::info!(
            url = %seed,
            pages = report.pages.len(),
            external = report.skipped_external.len(),
            fragments = report.skipped_fragment.len(),
            failures = report.failures.len(),
            "Crawl finished"
        );
        Ok(report)
    }
}
