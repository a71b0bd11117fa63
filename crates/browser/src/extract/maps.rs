//! Google Maps place extraction.
//!
//! The results feed is virtualized: cards mount as the panel scrolls and
//! unmount as they leave view. Collection therefore scrolls in passes and
//! accumulates monotonically into a set keyed by place URL; an entry seen
//! once is never lost or overwritten by a later, emptier rescan.

use std::{collections::HashSet, time::Duration};

use {
    async_trait::async_trait,
    chromiumoxide::Page,
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::debug,
};

use crate::{blockers::catalog, error::Result, extract::Evaluator};

/// One place from the results feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsEntry {
    pub title: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

/// Raw card data as harvested from the feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlace {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub meta_label: Option<String>,
    #[serde(default)]
    pub descriptor: Option<String>,
}

/// The scrollable results panel. Live implementation drives the feed via
/// JavaScript; tests substitute scripted passes.
#[async_trait]
pub trait ResultPanel: Sync {
    /// Harvest the currently mounted cards.
    async fn scan(&self) -> Result<Vec<RawPlace>>;
    /// Scroll the feed down one viewport.
    async fn scroll_page(&self) -> Result<()>;
}

pub struct LivePanel<'a> {
    page: &'a Page,
}

impl<'a> LivePanel<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl ResultPanel for LivePanel<'_> {
    async fn scan(&self) -> Result<Vec<RawPlace>> {
        let card_selector = json!(catalog::MAPS_CARD_SELECTOR).to_string();
        let js = format!(
            r#"(() => Array.from(document.querySelectorAll({card_selector})).map(a => {{
  const card = a.closest('div[jsaction]') || a.parentElement;
  const ratingEl = card ? card.querySelector('span[role="img"]') : null;
  let descriptor = null;
  if (card && card.innerText) {{
    const line = card.innerText.split('\n').find(l => l.includes('·'));
    if (line) descriptor = line.trim();
  }}
  return {{
    title: a.getAttribute('aria-label') || '',
    href: a.href || '',
    meta_label: ratingEl ? ratingEl.getAttribute('aria-label') : null,
    descriptor: descriptor,
  }};
}}))()"#
        );
        let value = self.page.eval(&js).await?;
        serde_json::from_value(value)
            .map_err(|e| crate::error::BrowserError::EvalFailed(format!("bad place shape: {e}")))
    }

    async fn scroll_page(&self) -> Result<()> {
        let feed_selector = json!(catalog::MAPS_FEED_SELECTOR).to_string();
        let js = format!(
            "(() => {{ const feed = document.querySelector({feed_selector}); \
             if (feed) feed.scrollBy(0, feed.clientHeight); }})()"
        );
        self.page.eval(&js).await?;
        Ok(())
    }
}

/// How far to drive the feed.
#[derive(Debug, Clone, Copy)]
pub struct ScrollPlan {
    pub limit: usize,
    pub max_passes: usize,
    pub settle: Duration,
}

/// Scroll-and-accumulate until `limit` entries are collected, the pass cap
/// is reached, or a pass yields nothing new.
pub async fn collect_scrolled(panel: &dyn ResultPanel, plan: ScrollPlan) -> Result<Vec<MapsEntry>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries: Vec<MapsEntry> = Vec::new();

    absorb(&panel.scan().await?, &mut seen, &mut entries, plan.limit);

    let mut pass = 0;
    while entries.len() < plan.limit && pass < plan.max_passes {
        pass += 1;
        panel.scroll_page().await?;
        tokio::time::sleep(plan.settle).await;

        let before = entries.len();
        absorb(&panel.scan().await?, &mut seen, &mut entries, plan.limit);
        if entries.len() == before {
            debug!(pass, collected = entries.len(), "feed stopped yielding new places");
            break;
        }
    }

    debug!(passes = pass, collected = entries.len(), "maps collection finished");
    Ok(entries)
}

/// Fold a scan into the accumulator. First sighting of an href wins; a
/// later rescan never replaces it.
fn absorb(
    places: &[RawPlace],
    seen: &mut HashSet<String>,
    entries: &mut Vec<MapsEntry>,
    limit: usize,
) {
    for place in places {
        if entries.len() >= limit {
            return;
        }
        if place.title.is_empty() || place.href.is_empty() {
            continue;
        }
        if !seen.insert(place.href.clone()) {
            continue;
        }
        let (rating, reviews) = place
            .meta_label
            .as_deref()
            .map(parse_place_meta)
            .unwrap_or((None, None));
        entries.push(MapsEntry {
            title: place.title.clone(),
            href: place.href.clone(),
            rating,
            reviews,
            descriptor: place.descriptor.clone(),
        });
    }
}

/// Parse a rating aria-label like "4.6 stars 1,284 Reviews" into
/// `(rating, review_count)`. Ratings outside 0..=5 are discarded.
fn parse_place_meta(label: &str) -> (Option<f64>, Option<u64>) {
    let mut rating = None;
    let mut reviews = None;
    let mut after_stars = false;

    for token in label.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        if rating.is_none() {
            if let Ok(value) = cleaned.parse::<f64>() {
                if (0.0..=5.0).contains(&value) {
                    rating = Some(value);
                    continue;
                }
            }
        }
        let lower = token.to_lowercase();
        if lower.starts_with("star") {
            after_stars = true;
            continue;
        }
        if after_stars && reviews.is_none() {
            let digits: String = token.chars().filter(char::is_ascii_digit).collect();
            if let Ok(count) = digits.parse::<u64>() {
                reviews = Some(count);
            }
        }
    }

    (rating, reviews)
}
