//! HTML cleaning and candidate-link extraction
//!
//! This module turns raw page markup into:
//! - Cleaned text, with non-content elements removed and truncated to a
//!   budget that prefers tables and lists over flowing text
//! - A deduplicated, classified and capped list of candidate links

use crate::config::CrawlerConfig;
use crate::url::{normalize_parsed, same_domain, NormalizedUrl};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use url::Url;

/// Path suffixes that mark a link as a data download
pub const DOWNLOAD_EXTENSIONS: &[&str] = &[
    ".gz", ".zip", ".tar", ".bz2", ".xz", ".7z", ".csv", ".tsv", ".txt", ".json", ".xml",
    ".parquet", ".feather", ".hdf5", ".h5", ".mat", ".npz", ".npy", ".pkl", ".pickle",
];

/// Elements whose whole subtree is dropped before extraction
const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "form", "iframe", "noscript", "svg",
    "button", "input", "select", "textarea",
];

/// Maximum characters kept from an anchor's text
const MAX_LINK_TEXT: usize = 100;

/// Per-block caps used when tables and lists are promoted during truncation
const MAX_TABLE_TEXT: usize = 2000;
const MAX_LIST_TEXT: usize = 1000;

/// Whether a link points at a file to download or a page to traverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Download,
    Page,
}

/// A candidate link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: NormalizedUrl,
    /// Anchor text, clipped to 100 characters
    pub text: String,
    pub kind: LinkKind,
}

/// Result of extracting a page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub text: String,
    /// Download links first, then page links
    pub links: Vec<Link>,
}

impl ExtractedPage {
    /// Splits the links into (download links, page links), preserving order
    pub fn split_links(&self) -> (Vec<Link>, Vec<Link>) {
        self.links
            .iter()
            .cloned()
            .partition(|link| link.kind == LinkKind::Download)
    }
}

/// Classifies a URL by its path suffix
pub fn classify_link(url: &Url) -> LinkKind {
    let path = url.path().to_lowercase();
    if DOWNLOAD_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        LinkKind::Download
    } else {
        LinkKind::Page
    }
}

/// Extracts text and candidate links from page markup
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    max_text_length: usize,
    max_links: usize,
    same_domain_only: bool,
}

impl LinkExtractor {
    pub fn new(max_text_length: usize, max_links: usize, same_domain_only: bool) -> Self {
        Self {
            max_text_length,
            max_links,
            same_domain_only,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_text_length,
            config.max_links,
            config.same_domain_only,
        )
    }

    /// Cleans `html` and extracts its candidate links
    ///
    /// # Link Rules
    ///
    /// - hrefs are resolved against `base_url` and normalized; duplicates
    ///   within the page are dropped
    /// - fragment-only, `javascript:`, `mailto:`, `tel:` and `data:` hrefs
    ///   are skipped, as is anything that does not resolve to HTTP(S)
    /// - cross-domain page links are dropped when `same_domain_only` is set;
    ///   cross-domain download links are always kept
    /// - the list is capped at `max_links`, filled with download links first
    ///
    /// # Example
    ///
    /// ```
    /// use dataset_harvester::crawler::{LinkExtractor, LinkKind};
    /// use url::Url;
    ///
    /// let html = r#"<body><a href="/g.csv">graph</a><a href="/about">about</a></body>"#;
    /// let base = Url::parse("https://ex.org/d").unwrap();
    /// let page = LinkExtractor::new(8000, 200, true).extract(html, &base);
    /// assert_eq!(page.links[0].kind, LinkKind::Download);
    /// assert_eq!(page.links[1].url.as_str(), "https://ex.org/about");
    /// ```
    pub fn extract(&self, html: &str, base_url: &Url) -> ExtractedPage {
        let document = Html::parse_document(html);

        let mut content = Content::default();
        walk(document.root_element(), &mut content);

        let links = self.collect_links(&content.anchors, base_url);

        let mut text = clean_text(&content.texts.join("\n"));
        if text.chars().count() > self.max_text_length {
            text = self.truncate(&content, &text);
        }

        ExtractedPage { text, links }
    }

    fn collect_links(&self, anchors: &[(String, String)], base_url: &Url) -> Vec<Link> {
        let mut seen = HashSet::new();
        let mut downloads = Vec::new();
        let mut pages = Vec::new();

        for (href, text) in anchors {
            let Some(absolute) = resolve_href(href, base_url) else {
                continue;
            };

            let Ok(normalized) = normalize_parsed(&absolute) else {
                continue;
            };

            if !seen.insert(normalized.clone()) {
                continue;
            }

            let kind = classify_link(&absolute);
            if kind == LinkKind::Page
                && self.same_domain_only
                && !same_domain(base_url.as_str(), absolute.as_str())
            {
                continue;
            }

            let link = Link {
                url: normalized,
                text: clip(text, MAX_LINK_TEXT),
                kind,
            };

            match kind {
                LinkKind::Download => downloads.push(link),
                LinkKind::Page => pages.push(link),
            }
        }

        downloads.truncate(self.max_links);
        let remaining = self.max_links - downloads.len();
        downloads.extend(pages.into_iter().take(remaining));
        downloads
    }

    /// Truncates page text, promoting tables and lists ahead of prose
    fn truncate(&self, content: &Content, text: &str) -> String {
        let mut important = Vec::new();

        for table in &content.tables {
            important.push(format!("[Table]\n{}", clip(table, MAX_TABLE_TEXT)));
        }
        for list in &content.lists {
            important.push(format!("[List]\n{}", clip(list, MAX_LIST_TEXT)));
        }

        if important.is_empty() {
            return clip(text, self.max_text_length);
        }

        let important = important.join("\n\n");
        let important_len = important.chars().count();
        let remaining = self.max_text_length.saturating_sub(important_len + 100);

        if remaining > 500 {
            format!(
                "{}\n\n[Other content]\n{}",
                important,
                clip(text, remaining)
            )
        } else {
            clip(&important, self.max_text_length)
        }
    }
}

/// Everything gathered from one pass over the document
#[derive(Debug, Default)]
struct Content {
    texts: Vec<String>,
    /// (href, anchor text)
    anchors: Vec<(String, String)>,
    tables: Vec<String>,
    lists: Vec<String>,
}

fn is_removed(name: &str) -> bool {
    REMOVED_ELEMENTS.contains(&name)
}

/// Walks the element tree, skipping removed subtrees and comments
fn walk(element: ElementRef<'_>, content: &mut Content) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => content.texts.push(String::from(&**text)),
            Node::Element(el) if !is_removed(el.name()) => {
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };

                match el.name() {
                    "a" => {
                        if let Some(href) = el.attr("href") {
                            content
                                .anchors
                                .push((href.to_string(), collect_text(child_element, "")));
                        }
                    }
                    "table" => content.tables.push(collect_text(child_element, " | ")),
                    "ul" | "ol" => content.lists.push(collect_text(child_element, "\n")),
                    _ => {}
                }

                walk(child_element, content);
            }
            _ => {}
        }
    }
}

/// Joins the trimmed, non-empty text pieces under `element`
fn collect_text(element: ElementRef<'_>, separator: &str) -> String {
    let mut pieces = Vec::new();
    gather_text(element, &mut pieces);
    pieces.join(separator)
}

fn gather_text(element: ElementRef<'_>, pieces: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    pieces.push(trimmed.to_string());
                }
            }
            Node::Element(el) if !is_removed(el.name()) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    gather_text(child_element, pieces);
                }
            }
            _ => {}
        }
    }
}

/// Trims every line and collapses runs of blank lines into one
fn clean_text(raw: &str) -> String {
    let mut lines = Vec::new();
    let mut previous_empty = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !previous_empty {
                lines.push("");
                previous_empty = true;
            }
        } else {
            lines.push(line);
            previous_empty = false;
        }
    }

    lines.join("\n").trim().to_string()
}

/// Resolves an href to an absolute HTTP(S) URL
///
/// Returns None for links that never lead anywhere fetchable.
fn resolve_href(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute)
    } else {
        None
    }
}

/// First `max` characters of `s`
fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
