//! Site crawling: the fetch capability and the same-domain crawl policy.

mod crawler;
mod fetcher;

pub use crawler::{classify_link, CrawlReport, Crawler, LinkDecision};
pub use fetcher::{anchor_hrefs, HttpFetcher, PageFetcher, RawPage};
