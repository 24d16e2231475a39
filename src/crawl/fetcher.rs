//! Page fetching capability.
//!
//! `PageFetcher` is stateless from the crawler's point of view: one call per URL,
//! no navigation state carried between calls.

use async_trait::async_trait;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::core::config::CrawlConfig;
use crate::core::errors::ApiError;
use crate::rag::normalizer::extract_title;

/// Content of one fetched URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    pub html: String,
    /// Text as a reader would see it after rendering.
    pub rendered_text: String,
    pub title: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawPage, ApiError>;

    /// Anchor targets found in `html`, as written in the markup (absolute,
    /// root-relative or fragment).
    fn enumerate_links(&self, html: &str, base_url: &str) -> Vec<String>;
}

/// Plain HTTP fetcher. It does not execute scripts, so there is no separately
/// rendered text: `rendered_text` stays empty and the normalizer works from the HTML.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(std::time::Duration::from_secs(10)))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage, ApiError> {
        let mut response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| ApiError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Fetch(format!("{}: HTTP {}", url, status)));
        }
        let final_url = response.url().to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ApiError::Fetch(format!("{}: {}", url, e)))?
        {
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                return Err(ApiError::Fetch(format!(
                    "{}: body exceeded {} bytes",
                    url, self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&bytes).into_owned();
        let title = extract_title(&html).unwrap_or_default();

        Ok(RawPage {
            url: final_url,
            html,
            rendered_text: String::new(),
            title,
        })
    }

    fn enumerate_links(&self, html: &str, _base_url: &str) -> Vec<String> {
        anchor_hrefs(html)
    }
}

/// `href` values of every anchor, trimmed, in document order.
pub fn anchor_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}
