//! Search-results extraction.
//!
//! One JavaScript pass harvests raw card data (every snippet candidate at
//! once, plus top stories and the AI overview); Rust then resolves each
//! card's snippet through a fallback chain, filters noise lines, dedups,
//! and optionally enriches snippetless results by fetching the target
//! page's meta description.

use std::{collections::HashSet, time::Duration};

use {
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::{debug, info},
};

use crate::{
    blockers::catalog,
    error::Result,
    extract::Evaluator,
};

/// One organic result, as returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_path: Option<String>,
}

/// One headline from the top-stories carousel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopStory {
    pub title: String,
    pub link: String,
}

/// Raw per-card data harvested from the page, before any shaping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCard {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub snippet_text: Option<String>,
    #[serde(default)]
    pub data_attr_text: Option<String>,
    #[serde(default)]
    pub scoped_text: Option<String>,
    #[serde(default)]
    pub site_path: Option<String>,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHarvest {
    #[serde(default)]
    pub cards: Vec<RawCard>,
    #[serde(default)]
    pub top_stories: Vec<TopStory>,
    #[serde(default)]
    pub ai_overview: Option<String>,
}

/// Build the single-pass harvest script from the selector catalogs.
fn harvest_js() -> String {
    let result_selectors = json!(catalog::SEARCH_RESULT_SELECTORS.join(", ")).to_string();
    let snippet_selectors = json!(catalog::SNIPPET_SELECTORS).to_string();
    let data_attrs = json!(catalog::SNIPPET_DATA_ATTRS).to_string();
    let video_selectors = json!(catalog::VIDEO_CARD_SELECTORS.join(", ")).to_string();
    let ai_selectors = json!(catalog::AI_OVERVIEW_SELECTORS).to_string();
    let stories_containers = json!(catalog::TOP_STORIES_CONTAINER_SELECTORS).to_string();
    let stories_link = json!(catalog::TOP_STORIES_LINK_SELECTOR).to_string();

    format!(
        r#"(() => {{
  const cards = Array.from(document.querySelectorAll({result_selectors})).map(card => {{
    const anchor = card.querySelector('a[href]');
    const heading = card.querySelector('h3');
    let snippetText = null;
    for (const sel of {snippet_selectors}) {{
      const el = card.querySelector(sel);
      if (el && el.innerText && el.innerText.trim()) {{ snippetText = el.innerText.trim(); break; }}
    }}
    let dataAttrText = null;
    for (const attr of {data_attrs}) {{
      const el = card.querySelector('[' + attr + ']');
      if (el && el.innerText && el.innerText.trim()) {{ dataAttrText = el.innerText.trim(); break; }}
    }}
    const cite = card.querySelector('cite');
    const scoped = card.querySelector('div[data-content-feature] span, div[style*="-webkit-line-clamp"]');
    return {{
      title: heading ? heading.innerText.trim() : '',
      href: anchor ? anchor.href : '',
      is_video: card.querySelector({video_selectors}) !== null,
      snippet_text: snippetText,
      data_attr_text: dataAttrText,
      scoped_text: scoped && scoped.innerText ? scoped.innerText.trim() : null,
      site_path: cite && cite.innerText ? cite.innerText.trim() : null,
      lines: card.innerText ? card.innerText.split('\n').map(l => l.trim()).filter(l => l) : [],
    }};
  }});

  const topStories = [];
  for (const containerSel of {stories_containers}) {{
    const container = document.querySelector(containerSel);
    if (!container) continue;
    for (const a of container.querySelectorAll({stories_link})) {{
      const text = a.innerText ? a.innerText.trim().split('\n')[0] : '';
      if (text && a.href) topStories.push({{ title: text, link: a.href }});
    }}
    if (topStories.length) break;
  }}

  let aiOverview = null;
  for (const sel of {ai_selectors}) {{
    const el = document.querySelector(sel);
    if (el && el.innerText && el.innerText.trim().length > 40) {{
      aiOverview = el.innerText.trim();
      break;
    }}
  }}

  return {{ cards, top_stories: topStories, ai_overview: aiOverview }};
}})()"#
    )
}

/// Harvest the results page in one evaluation.
pub async fn harvest(eval: &dyn Evaluator) -> Result<RawHarvest> {
    let value = eval.eval(&harvest_js()).await?;
    let harvest: RawHarvest = serde_json::from_value(value)
        .map_err(|e| crate::error::BrowserError::EvalFailed(format!("bad harvest shape: {e}")))?;
    debug!(
        cards = harvest.cards.len(),
        top_stories = harvest.top_stories.len(),
        ai_overview = harvest.ai_overview.is_some(),
        "harvested results page"
    );
    Ok(harvest)
}

/// Shape raw cards into final results: drop videos and titleless cards,
/// dedup by href (first occurrence wins, matching page order), cap at
/// `limit`.
pub fn assemble(cards: Vec<RawCard>, limit: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for card in cards {
        if out.len() >= limit {
            break;
        }
        if card.is_video || card.title.is_empty() || card.href.is_empty() {
            continue;
        }
        if !seen.insert(card.href.clone()) {
            continue;
        }
        let snippet = resolve_snippet(&card);
        out.push(SearchResult {
            title: card.title,
            link: card.href,
            snippet,
            site_path: card.site_path,
        });
    }

    out
}

/// Resolve a card's snippet through the fallback chain: dedicated snippet
/// element, then data-attribute text, then scoped container text, then the
/// card's filtered text lines.
fn resolve_snippet(card: &RawCard) -> Option<String> {
    for candidate in [&card.snippet_text, &card.data_attr_text, &card.scoped_text] {
        if let Some(text) = candidate {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_owned());
            }
        }
    }

    let lines: Vec<&str> = card
        .lines
        .iter()
        .map(String::as_str)
        .filter(|line| keep_snippet_line(line, &card.title))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

/// Whether a raw card text line could plausibly be snippet prose.
fn keep_snippet_line(line: &str, title: &str) -> bool {
    let line = line.trim();
    line.len() > 20
        && line != title
        && !looks_like_url(line)
        && !looks_like_breadcrumb(line)
        && !looks_like_timestamp(line)
        && !looks_like_view_count(line)
}

fn looks_like_url(line: &str) -> bool {
    line.starts_with("http://") || line.starts_with("https://") || line.starts_with("www.")
}

fn looks_like_breadcrumb(line: &str) -> bool {
    line.contains(" › ")
}

fn looks_like_timestamp(line: &str) -> bool {
    if line.ends_with(" ago") {
        return true;
    }
    const MONTHS: &[&str] = &[
        "Jan ", "Feb ", "Mar ", "Apr ", "May ", "Jun ", "Jul ", "Aug ", "Sep ", "Oct ", "Nov ",
        "Dec ",
    ];
    line.len() < 30 && MONTHS.iter().any(|m| line.starts_with(m))
}

fn looks_like_view_count(line: &str) -> bool {
    line.len() < 25 && line.to_lowercase().contains("views")
}

/// Bounded fetcher that fills in missing snippets from each target page's
/// `<meta name="description">`. Off by default; the operator opts in per
/// deployment since it makes outbound requests to result URLs.
#[derive(Clone)]
pub struct SnippetFetcher {
    client: reqwest::Client,
    max_attempts: usize,
    timeout: Duration,
}

impl SnippetFetcher {
    pub fn new(max_attempts: usize, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(3))
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| crate::error::BrowserError::Other(anyhow::anyhow!(e)))?;
        Ok(Self {
            client,
            max_attempts,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Fill in missing snippets with at most `max_attempts` fetches. Fetch
    /// failures are logged and skipped; enrichment never fails the job.
    pub async fn enrich(&self, results: &mut [SearchResult]) {
        let mut attempts = 0;
        let mut filled = 0;
        for result in results.iter_mut() {
            if attempts >= self.max_attempts {
                break;
            }
            if result.snippet.is_some() {
                continue;
            }
            attempts += 1;
            match self.fetch_description(&result.link).await {
                Ok(Some(description)) => {
                    result.snippet = Some(description);
                    filled += 1;
                },
                Ok(None) => debug!(url = %result.link, "no meta description"),
                Err(e) => debug!(url = %result.link, error = %e, "snippet fetch failed"),
            }
        }
        if attempts > 0 {
            info!(attempts, filled, "snippet enrichment pass");
        }
    }

    async fn fetch_description(&self, url: &str) -> Result<Option<String>> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                crate::error::BrowserError::NavigationTimeout(self.timeout.as_millis() as u64)
            })?
            .map_err(|e| crate::error::BrowserError::NavigationFailed(e.to_string()))?;
        let html = response
            .text()
            .await
            .map_err(|e| crate::error::BrowserError::NavigationFailed(e.to_string()))?;
        Ok(meta_description(&html))
    }
}

/// Pull `<meta name="description" content="...">` out of raw HTML without
/// a full parse. Only scans the head-ish prefix of the document.
///
/// Matching is ASCII-case-insensitive on the original string. Lowercasing
/// a copy and reusing its byte offsets is not safe here: lowercasing can
/// change byte length (e.g. U+0130), which would shift every later offset.
pub fn meta_description(html: &str) -> Option<String> {
    let mut cutoff = html.len().min(64 * 1024);
    while !html.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    let scan = &html[..cutoff];

    let mut at = 0;
    while let Some(start) = find_ascii_ci(scan, "<meta", at) {
        let end = scan[start..].find('>').map(|e| start + e)?;
        let tag = &scan[start..=end];

        let is_description = attr_value(tag, "name")
            .map(|v| v.eq_ignore_ascii_case("description"))
            .unwrap_or(false);
        if is_description {
            if let Some(content) = attr_value(tag, "content") {
                let content = content.trim();
                if !content.is_empty() {
                    return Some(content.to_owned());
                }
            }
        }
        at = end + 1;
    }
    None
}

/// ASCII-case-insensitive substring search starting at `from`.
/// `needle` must be plain ASCII so every hit lands on a char boundary.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(pat.len())
        .position(|window| window.eq_ignore_ascii_case(pat))
        .map(|p| from + p)
}

/// Find `attr="value"` or `attr='value'` inside a single tag.
fn attr_value<'a>(tag: &'a str, attr: &str) -> Option<&'a str> {
    let needle = format!("{attr}=");
    let mut at = 0;
    loop {
        let pos = find_ascii_ci(tag, &needle, at)?;
        // Must be a word boundary, not e.g. "data-name=".
        let ok_boundary = pos == 0
            || !tag
                .as_bytes()
                .get(pos - 1)
                .map(|b| b.is_ascii_alphanumeric() || *b == b'-')
                .unwrap_or(false);
        let value_start = pos + needle.len();
        if !ok_boundary {
            at = value_start;
            continue;
        }
        let quote = tag.as_bytes().get(value_start)?;
        if *quote != b'"' && *quote != b'\'' {
            at = value_start;
            continue;
        }
        let rest = &tag[value_start + 1..];
        let close = rest.find(*quote as char)?;
        return Some(&rest[..close]);
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn card(title: &str, href: &str) -> RawCard {
        RawCard {
            title: title.into(),
            href: href.into(),
            ..Default::default()
        }
    }

    #[test]
    fn assemble_dedups_by_href_keeping_first() {
        let mut first = card("First", "https://example.com/a");
        first.snippet_text = Some("kept".into());
        let second = card("Duplicate", "https://example.com/a");

        let out = assemble(vec![first, second], 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "First");
        assert_eq!(out[0].snippet.as_deref(), Some("kept"));
    }

    #[test]
    fn assemble_skips_videos_and_respects_limit() {
        let mut video = card("A video", "https://example.com/v");
        video.is_video = true;
        let cards = vec![
            video,
            card("One", "https://example.com/1"),
            card("Two", "https://example.com/2"),
            card("Three", "https://example.com/3"),
        ];

        let out = assemble(cards, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "One");
        assert_eq!(out[1].title, "Two");
    }

    #[test]
    fn no_cards_assemble_to_an_empty_list() {
        assert!(assemble(vec![], 10).is_empty());
    }

    #[test]
    fn snippet_chain_prefers_dedicated_element() {
        let mut c = card("T", "https://x");
        c.snippet_text = Some("from element".into());
        c.data_attr_text = Some("from attr".into());
        assert_eq!(resolve_snippet(&c).as_deref(), Some("from element"));
    }

    #[test]
    fn snippet_chain_falls_back_to_filtered_lines() {
        let mut c = card("Rust programming language", "https://rust-lang.org");
        c.lines = vec![
            "Rust programming language".into(),
            "https://rust-lang.org".into(),
            "rust-lang.org › learn".into(),
            "3 days ago".into(),
            "1.2M views".into(),
            "A language empowering everyone to build reliable software.".into(),
        ];
        assert_eq!(
            resolve_snippet(&c).as_deref(),
            Some("A language empowering everyone to build reliable software.")
        );
    }

    #[test]
    fn noise_line_predicates() {
        assert!(!keep_snippet_line("https://example.com/path/deep", "t"));
        assert!(!keep_snippet_line("www.example.com/some/long/path", "t"));
        assert!(!keep_snippet_line("example.com › docs › getting-started", "t"));
        assert!(!keep_snippet_line("about twenty-three hours ago", "t"));
        assert!(!keep_snippet_line("Mar 14, 2026", "t"));
        assert!(!keep_snippet_line("2,391,042 views", "t"));
        assert!(keep_snippet_line(
            "An actual descriptive sentence about the page.",
            "t"
        ));
    }

    #[test]
    fn meta_description_finds_either_quote_style() {
        let html = r#"<head><meta charset="utf-8">
            <meta name='description' content='Single quoted summary.'>
            </head>"#;
        assert_eq!(
            meta_description(html).as_deref(),
            Some("Single quoted summary.")
        );

        let html = r#"<meta content="Double quoted." name="Description">"#;
        assert_eq!(meta_description(html).as_deref(), Some("Double quoted."));
    }

    #[test]
    fn meta_description_survives_multibyte_prefix() {
        // U+0130 grows by a byte under lowercasing; offsets must still
        // land on the tag that follows.
        let mut html = "İ".repeat(100);
        html.push_str(r#"<META NAME="description" CONTENT="Found it.">"#);
        assert_eq!(meta_description(&html).as_deref(), Some("Found it."));
    }

    #[test]
    fn meta_description_ignores_other_meta_tags() {
        let html = r#"<meta name="og:description-like" content="nope">
            <meta name="viewport" content="width=device-width">"#;
        assert!(meta_description(html).is_none());
    }

    #[test]
    fn harvest_js_embeds_the_catalogs() {
        let js = harvest_js();
        assert!(js.contains(".tF2Cxc"));
        assert!(js.contains(".VwiC3b"));
        assert!(js.contains("video-voyager"));
    }
}
