//! Page normalization into self-describing chunks.
//!
//! The raw HTML is flattened to markdown-flavoured text (headings keep their `#`
//! markers), joined with the rendered text of the page and split on second-level
//! headings. Every titled chunk is prefixed with `Title: <heading>` so it still reads
//! sensibly when retrieved on its own.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::crawl::RawPage;

pub const TITLE_KEY: &str = "title";
pub const SOURCE_KEY: &str = "source";
pub const PAGE_TITLE_KEY: &str = "page_title";

const SKIPPED_TAGS: [&str; 7] = ["script", "style", "noscript", "template", "svg", "head", "iframe"];
const BLOCK_TAGS: [&str; 22] = [
    "p", "div", "section", "article", "main", "header", "footer", "aside", "nav", "ul", "ol",
    "li", "table", "tr", "blockquote", "pre", "form", "figure", "figcaption", "dl", "dt", "dd",
];

/// Unit of normalized text ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get(TITLE_KEY)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    /// Heading depth that starts a new chunk.
    split_level: usize,
}

impl Default for ContentNormalizer {
    fn default() -> Self {
        Self { split_level: 2 }
    }
}

impl ContentNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_level(mut self, level: usize) -> Self {
        self.split_level = level.clamp(1, 6);
        self
    }

    pub fn normalize(&self, page: &RawPage) -> Vec<DocumentChunk> {
        let combined = combine_sources(page);
        let marker = "#".repeat(self.split_level);

        split_on_heading(&combined, &marker)
            .into_iter()
            .filter_map(|section| {
                let body = section.body.trim();
                if body.is_empty() {
                    return None;
                }

                let mut metadata = BTreeMap::new();
                metadata.insert(SOURCE_KEY.to_string(), page.url.clone());
                let page_title = page.title.trim();
                if !page_title.is_empty() {
                    metadata.insert(PAGE_TITLE_KEY.to_string(), page_title.to_string());
                }

                let text = match section.title {
                    Some(title) => {
                        let text = format!("Title: {}\n\n{}", title, body);
                        metadata.insert(TITLE_KEY.to_string(), title);
                        text
                    }
                    None => body.to_string(),
                };

                Some(DocumentChunk { text, metadata })
            })
            .collect()
    }
}

fn combine_sources(page: &RawPage) -> String {
    let mut parts = Vec::with_capacity(3);
    let title = page.title.trim();
    if !title.is_empty() {
        parts.push(format!("# {}", title));
    }
    let html_text = html_to_text(&page.html);
    if !html_text.is_empty() {
        parts.push(html_text);
    }
    let rendered = page.rendered_text.trim();
    if !rendered.is_empty() {
        parts.push(rendered.to_string());
    }
    parts.join("\n")
}

struct Section {
    title: Option<String>,
    body: String,
}

/// Splits markdown text before every heading line of exactly `marker` depth.
/// The heading line stays at the top of its section; fenced code is never split.
fn split_on_heading(text: &str, marker: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        title: None,
        body: String::new(),
    };
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(title) = heading_title(trimmed, marker) {
                let previous = std::mem::replace(
                    &mut current,
                    Section {
                        title: Some(title),
                        body: String::new(),
                    },
                );
                sections.push(previous);
            }
        }

        current.body.push_str(line);
        current.body.push('\n');
    }
    sections.push(current);
    sections
}

fn heading_title(line: &str, marker: &str) -> Option<String> {
    let rest = line.strip_prefix(marker)?;
    // `###` must not match a `##` marker.
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim().to_string())
}

/// Flattens HTML to text, rendering `h1`..`h6` as markdown headings.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut writer = TextWriter::default();
    writer.walk(root);
    writer.finish()
}

/// Whitespace-collapsed `<title>` of an HTML document.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

#[derive(Default)]
struct TextWriter {
    lines: Vec<String>,
    current: String,
}

impl TextWriter {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_inline(text),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let tag = el.name();
                    if SKIPPED_TAGS.contains(&tag) {
                        continue;
                    }
                    if let Some(level) = heading_level(tag) {
                        self.break_line();
                        let text = collapse_whitespace(&child_ref.text().collect::<String>());
                        if !text.is_empty() {
                            self.lines.push(format!("{} {}", "#".repeat(level), text));
                        }
                        continue;
                    }
                    if tag == "br" {
                        self.break_line();
                        continue;
                    }

                    let block = BLOCK_TAGS.contains(&tag);
                    if block {
                        self.break_line();
                    }
                    if tag == "li" {
                        self.current.push_str("* ");
                    }
                    self.walk(child_ref);
                    if block {
                        self.break_line();
                    }
                }
                _ => {}
            }
        }
    }

    fn push_inline(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let starts_with_space = text.starts_with(char::is_whitespace);
        let ends_with_space = text.ends_with(char::is_whitespace);
        let collapsed = collapse_whitespace(text);

        if starts_with_space && !self.current.is_empty() && !self.current.ends_with(' ') {
            self.current.push(' ');
        }
        self.current.push_str(&collapsed);
        if ends_with_space && !collapsed.is_empty() {
            self.current.push(' ');
        }
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() && line != "*" {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str, rendered: &str, title: &str) -> RawPage {
        RawPage {
            url: "https://example.com/".to_string(),
            html: html.to_string(),
            rendered_text: rendered.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn html_headings_become_markdown() {
        let text = html_to_text(
            r#"<html><head><title>T</title><script>var x = 1;</script></head>
            <body><h1>Acme</h1><p>We build   <b>things</b>.</p>
            <h2>Services</h2><ul><li>Consulting</li><li>Training</li></ul></body></html>"#,
        );
        assert_eq!(
            text,
            "# Acme\nWe build things.\n## Services\n* Consulting\n* Training"
        );
    }

    #[test]
    fn splits_on_second_level_headings_with_title_prefix() {
        let chunks = ContentNormalizer::new().normalize(&page(
            "<body><p>Intro text</p><h2>About</h2><p>Founded in 2020.</p><h2>Contact</h2><p>Mail us.</p></body>",
            "",
            "Acme",
        ));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].title(), None);
        assert_eq!(chunks[0].text, "# Acme\nIntro text");

        assert_eq!(chunks[1].title(), Some("About"));
        assert_eq!(chunks[1].text, "Title: About\n\n## About\nFounded in 2020.");
        assert_eq!(chunks[2].title(), Some("Contact"));
        assert!(chunks[2].text.ends_with("## Contact\nMail us."));
        assert_eq!(chunks[2].metadata.get(PAGE_TITLE_KEY).map(String::as_str), Some("Acme"));
    }

    #[test]
    fn titled_chunks_always_start_with_title_header() {
        let chunks = ContentNormalizer::new().normalize(&page(
            "<h2>One</h2><p>a</p><h3>Sub</h3><p>b</p><h2>Two</h2>",
            "## Three\nrendered only",
            "",
        ));
        for chunk in &chunks {
            if let Some(title) = chunk.title() {
                assert!(chunk.text.starts_with(&format!("Title: {}", title)));
            }
            assert!(!chunk.text.trim().is_empty());
        }
        let titles: Vec<_> = chunks.iter().filter_map(|c| c.title()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert!(chunks[0].text.contains("### Sub"));
    }

    #[test]
    fn page_without_headings_is_one_untitled_chunk() {
        let chunks = ContentNormalizer::new().normalize(&page(
            "<p>Just a paragraph.</p>",
            "Some rendered copy.",
            "",
        ));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title(), None);
        assert_eq!(chunks[0].text, "Just a paragraph.\nSome rendered copy.");
        assert_eq!(chunks[0].source(), Some("https://example.com/"));
    }

    #[test]
    fn rendered_text_is_kept_alongside_html() {
        let chunks = ContentNormalizer::new().normalize(&page(
            "<div id=\"root\"></div>",
            "Client side content",
            "App",
        ));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "# App\nClient side content");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(ContentNormalizer::new().normalize(&page("", "", "")).is_empty());
    }

    #[test]
    fn fenced_code_is_not_split() {
        let chunks = ContentNormalizer::new().normalize(&page(
            "",
            "## Usage\n```\n## not a heading\n```\nend",
            "",
        ));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title(), Some("Usage"));
    }

    #[test]
    fn extracts_document_title() {
        assert_eq!(
            extract_title("<html><head><title> Acme \n Home </title></head></html>"),
            Some("Acme Home".to_string())
        );
        assert_eq!(extract_title("<p>none</p>"), None);
    }
}
