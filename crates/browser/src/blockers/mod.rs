//! Access-blocker classification.
//!
//! After navigation settles, the landed page is classified before any
//! extraction runs: cookie/consent walls first, then CAPTCHA and bot
//! challenges, then a last-resort check that the caller's required
//! selectors are all absent. Classification is best-effort and fails open:
//! if the page cannot even be probed, the job proceeds to extraction and
//! fails (or succeeds) on its own merits there.

pub mod catalog;

use {
    async_trait::async_trait,
    chromiumoxide::Page,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::error::Result;

/// What kind of blocker stands between us and the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerKind {
    Cookie,
    Captcha,
    UnknownMissingContent,
}

/// The concrete signals that led to a verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockerEvidence {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub selectors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub phrases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub iframes: Vec<String>,
}

impl BlockerEvidence {
    fn is_empty(&self) -> bool {
        self.selectors.is_empty() && self.phrases.is_empty() && self.iframes.is_empty()
    }
}

/// A positive classification, attached to the job output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockerVerdict {
    pub kind: BlockerKind,
    pub reason: String,
    pub evidence: BlockerEvidence,
    /// True when the verdict rests solely on the caller's required
    /// selectors being absent.
    pub missing_required: bool,
}

/// Read-only view of the landed page, as much of it as can be probed.
#[async_trait]
pub trait PageProbe: Sync {
    async fn selector_exists(&self, selector: &str) -> Result<bool>;
    async fn body_text(&self) -> Result<String>;
    async fn html(&self) -> Result<String>;
    async fn frame_sources(&self) -> Result<Vec<String>>;
}

/// Probe backed by the live CDP page.
pub struct LiveProbe<'a> {
    page: &'a Page,
}

impl<'a> LiveProbe<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    async fn eval_json(&self, js: &str) -> Result<serde_json::Value> {
        let value = self
            .page
            .evaluate(js)
            .await?
            .into_value()
            .map_err(|e| crate::error::BrowserError::Cdp(e.to_string()))?;
        Ok(value)
    }
}

#[async_trait]
impl PageProbe for LiveProbe<'_> {
    async fn selector_exists(&self, selector: &str) -> Result<bool> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| crate::error::BrowserError::Cdp(e.to_string()))?;
        let js = format!("document.querySelector({quoted}) !== null");
        Ok(self.eval_json(&js).await?.as_bool().unwrap_or(false))
    }

    async fn body_text(&self) -> Result<String> {
        let value = self
            .eval_json("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    async fn html(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn frame_sources(&self) -> Result<Vec<String>> {
        let value = self
            .eval_json("Array.from(document.querySelectorAll('iframe')).map(f => f.src || '')")
            .await?;
        let sources = value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(sources)
    }
}

/// Classify the landed page. `required` is the caller's list of selectors
/// that must exist for the page to count as having its content.
///
/// Returns `None` for a clean page, and also when the page cannot be
/// probed at all (fail open).
pub async fn classify(probe: &dyn PageProbe, required: &[String]) -> Option<BlockerVerdict> {
    match classify_inner(probe, required).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "blocker classification failed, treating page as clean");
            None
        },
    }
}

async fn classify_inner(
    probe: &dyn PageProbe,
    required: &[String],
) -> Result<Option<BlockerVerdict>> {
    let body = probe.body_text().await?;
    let body_lower = body.to_lowercase();

    // Cookie walls often overlay CAPTCHA markup; the consent dialog is the
    // one actually blocking the view, so it is checked first.
    let mut evidence = BlockerEvidence::default();
    collect_selector_hits(probe, catalog::COOKIE_SELECTORS, &mut evidence.selectors).await;
    collect_phrase_hits(&body_lower, catalog::COOKIE_PHRASES, &mut evidence.phrases);
    if !evidence.is_empty() {
        return Ok(Some(BlockerVerdict {
            kind: BlockerKind::Cookie,
            reason: "cookie or consent interstitial detected".into(),
            evidence,
            missing_required: false,
        }));
    }

    let mut evidence = BlockerEvidence::default();
    collect_selector_hits(probe, catalog::CAPTCHA_SELECTORS, &mut evidence.selectors).await;
    collect_phrase_hits(&body_lower, catalog::CAPTCHA_PHRASES, &mut evidence.phrases);

    match probe.frame_sources().await {
        Ok(sources) => {
            for src in &sources {
                if catalog::CHALLENGE_FRAME_PATTERNS.iter().any(|p| src.contains(p)) {
                    evidence.iframes.push(src.clone());
                }
            }
        },
        Err(e) => debug!(error = %e, "could not enumerate iframes"),
    }

    // Raw-markup scan catches widgets that have not rendered yet.
    if let Ok(html) = probe.html().await {
        for marker in catalog::CHALLENGE_MARKUP {
            if html.contains(marker) {
                evidence.phrases.push(format!("markup:{marker}"));
            }
        }
    }

    if !evidence.is_empty() {
        return Ok(Some(BlockerVerdict {
            kind: BlockerKind::Captcha,
            reason: "CAPTCHA or bot challenge detected".into(),
            evidence,
            missing_required: false,
        }));
    }

    // Last resort: the page loaded, nothing recognizable is blocking it,
    // yet none of the content the caller asked for is present.
    if !required.is_empty() {
        let mut any_present = false;
        for selector in required {
            match probe.selector_exists(selector).await {
                Ok(true) => {
                    any_present = true;
                    break;
                },
                Ok(false) => {},
                Err(e) => debug!(selector, error = %e, "required-selector probe failed"),
            }
        }
        if !any_present {
            return Ok(Some(BlockerVerdict {
                kind: BlockerKind::UnknownMissingContent,
                reason: "page loaded but none of the expected content is present".into(),
                evidence: BlockerEvidence::default(),
                missing_required: true,
            }));
        }
    }

    Ok(None)
}

async fn collect_selector_hits(probe: &dyn PageProbe, selectors: &[&str], out: &mut Vec<String>) {
    for selector in selectors {
        match probe.selector_exists(selector).await {
            Ok(true) => out.push((*selector).to_owned()),
            Ok(false) => {},
            Err(e) => debug!(selector, error = %e, "selector probe failed"),
        }
    }
}

fn collect_phrase_hits(body_lower: &str, phrases: &[&str], out: &mut Vec<String>) {
    for phrase in phrases {
        if body_lower.contains(phrase) {
            out.push((*phrase).to_owned());
        }
    }
}
