//! Web content fetching with cleaning, caching, and quality gating.
//!
//! Turns a [`KnowledgeSourceLocator`] into clean text or nothing —
//! never an error. Fetch failures (network, non-2xx, junk content) are
//! logged and swallowed so one bad source can't take down a query.
//!
//! Extraction walks the parsed HTML skipping script/style/navigation
//! subtrees, preferring the most specific content container from an
//! ordered selector list before falling back to the whole body.
//!
//! Successful fetches are cached in-process, keyed by URL with a
//! time-based expiry; cache hits bypass the network entirely. The
//! cache is constructor-owned state with an explicit
//! [`WebFetcher::clear_cache`] — no process-wide singletons.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::WebConfig;
use crate::models::{KnowledgeSourceLocator, WebDocument};

/// Appended when a page is cut at the length cap.
pub const CONTENT_TRUNCATION_MARKER: &str =
    "...\n[content truncated - see full documentation at source URL]";

const DEFAULT_TITLE: &str = "Documentation";

/// Content containers tried most-specific-first before falling back to
/// `body`.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    ".main-content",
    ".content",
    ".article-content",
    ".documentation-content",
    "#main-content",
    ".book-content",
    ".chapter-content",
    ".section-content",
];

/// Subtrees that never contribute content text.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript",
];

struct CacheEntry {
    fetched: Instant,
    doc: WebDocument,
}

pub struct WebFetcher {
    client: reqwest::Client,
    config: WebConfig,
    whitespace: Regex,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl WebFetcher {
    pub fn new(config: WebConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            whitespace: Regex::new(r"\s+").expect("static regex"),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Fetch and clean one locator. Returns `None` on any failure or
    /// quality rejection; the reason is logged, not raised.
    pub async fn fetch(&self, locator: &KnowledgeSourceLocator) -> Option<WebDocument> {
        {
            let cache = self.cache.read().unwrap();
            if let Some(entry) = cache.get(&locator.url) {
                if entry.fetched.elapsed() < Duration::from_secs(self.config.cache_ttl_secs) {
                    debug!("cache hit for {}", locator.url);
                    return Some(entry.doc.clone());
                }
            }
        }

        let response = match self
            .client
            .get(&locator.url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("network error fetching {}: {}", locator.url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("fetch of {} returned {}", locator.url, response.status());
            return None;
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to read body of {}: {}", locator.url, e);
                return None;
            }
        };

        let doc = self.process_body(&locator.url, &body)?;

        let mut cache = self.cache.write().unwrap();
        cache.insert(
            locator.url.clone(),
            CacheEntry {
                fetched: Instant::now(),
                doc: doc.clone(),
            },
        );

        Some(doc)
    }

    /// Fetch a batch of locators sequentially, pausing the configured
    /// interval between consecutive network fetches. Each failure is
    /// isolated: a dead site only loses its own entry.
    pub async fn fetch_all(&self, locators: &[KnowledgeSourceLocator]) -> Vec<WebDocument> {
        let mut docs = Vec::new();

        for (i, locator) in locators.iter().enumerate() {
            if i > 0 && self.config.fetch_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.fetch_pause_ms)).await;
            }
            if let Some(doc) = self.fetch(locator).await {
                docs.push(doc);
            }
        }

        debug!("fetched {} of {} locators", docs.len(), locators.len());
        docs
    }

    /// Drop all cached fetches.
    pub fn clear_cache(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Clean, gate, and truncate a fetched page body. Split from
    /// [`WebFetcher::fetch`] so the filtering rules are testable
    /// without a network.
    fn process_body(&self, url: &str, body: &str) -> Option<WebDocument> {
        let (title, raw_text) = extract_page_text(body);
        let text = self.whitespace.replace_all(raw_text.trim(), " ").to_string();

        if text.len() < self.config.min_content_length {
            debug!("content too short for {}: {} chars", url, text.len());
            return None;
        }

        let text_lower = text.to_lowercase();
        if let Some(pattern) = self
            .config
            .exclude_patterns
            .iter()
            .find(|p| text_lower.contains(p.to_lowercase().as_str()))
        {
            debug!("content of {} rejected by exclude pattern {:?}", url, pattern);
            return None;
        }

        let text = if text.len() > self.config.max_content_length {
            let cut = floor_char_boundary(&text, self.config.max_content_length);
            format!("{}{}", &text[..cut], CONTENT_TRUNCATION_MARKER)
        } else {
            text
        };

        Some(WebDocument {
            url: url.to_string(),
            doc_type: classify_doc_type(url, &title),
            title,
            content: text,
            fetched_at: Utc::now(),
        })
    }
}

/// Extract (title, content text) from an HTML page.
fn extract_page_text(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = first_text(&document, "title")
        .or_else(|| first_text(&document, "h1"))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| document.select(&sel).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| document.select(&sel).next())
        });

    let mut text = String::new();
    match root {
        Some(el) => collect_text(el, &mut text),
        None => collect_text(document.root_element(), &mut text),
    }

    (title, text)
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Depth-first text collection skipping excluded subtrees.
fn collect_text(node: ElementRef, out: &mut String) {
    if EXCLUDED_TAGS.contains(&node.value().name()) {
        return;
    }

    for child in node.children() {
        if let Some(text) = child.value().as_text() {
            let content = text.trim();
            if !content.is_empty() {
                out.push_str(content);
                out.push(' ');
            }
        } else if let Some(el) = ElementRef::wrap(child) {
            collect_text(el, out);
        }
    }
}

/// Documentation-set label derived from the URL and page title.
fn classify_doc_type(url: &str, title: &str) -> String {
    let url_lower = url.to_lowercase();
    let title_lower = title.to_lowercase();
    let mentions = |needle: &str| url_lower.contains(needle) || title_lower.contains(needle);

    if mentions("openshift") {
        if mentions("virtualization") {
            "OpenShift Virtualization".to_string()
        } else if mentions("postinstall") || mentions("post-install") {
            "OpenShift Post-Installation".to_string()
        } else {
            "OpenShift Container Platform".to_string()
        }
    } else if mentions("rhel") || mentions("red_hat_enterprise_linux") {
        "Red Hat Enterprise Linux".to_string()
    } else if mentions("ansible") || mentions("automation_platform") {
        "Red Hat Ansible Automation Platform".to_string()
    } else {
        "Technical Documentation".to_string()
    }
}

/// Largest index `<= at` that falls on a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut idx = at;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
