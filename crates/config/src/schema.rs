//! Config schema types for the browser gateway.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanternConfig {
    pub browser: BrowserSection,
    pub search: SearchSection,
    pub maps: MapsSection,
}

/// Shared browser session configuration.
///
/// Viewport, locale and the stealth init script are launch-time invariants:
/// they apply when the session is (re)launched, never per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Persistent profile directory (cookies, local storage, cache).
    /// Created if absent, never deleted. Defaults to the user data dir.
    pub profile_dir: Option<String>,
    /// Viewport width applied at launch.
    pub viewport_width: u32,
    /// Viewport height applied at launch.
    pub viewport_height: u32,
    /// Device scale factor.
    pub device_scale_factor: f64,
    /// Accept-Language / --lang value applied at launch.
    pub locale: String,
    /// User agent override (browser default if not set).
    pub user_agent: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    /// Hard navigation timeout in milliseconds.
    pub navigation_timeout_ms: u64,
    /// Default selector-wait timeout in milliseconds (soft).
    pub wait_timeout_ms: u64,
    /// Queue concurrency slots; the session provisions one page per slot
    /// within the single shared browser and profile. 1 keeps strict
    /// serialization; raising it runs jobs side by side on separate pages
    /// of the same browsing identity.
    pub concurrency: usize,
    /// Whether caller-supplied evaluation expressions are accepted.
    /// This is remote code execution inside the browser context; leave off
    /// unless every caller is trusted with the deployment.
    pub allow_eval: bool,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            profile_dir: None,
            viewport_width: 1366,
            viewport_height: 768,
            device_scale_factor: 1.0,
            locale: "en-US".into(),
            user_agent: None,
            chrome_args: Vec::new(),
            navigation_timeout_ms: 30_000,
            wait_timeout_ms: 10_000,
            concurrency: 1,
            allow_eval: false,
        }
    }
}

/// Search endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Search URL prefix; the query is appended as `?q=`.
    pub base_url: String,
    /// Default maximum number of results returned.
    pub max_results: usize,
    /// Whether the out-of-band meta-description fetch for missing snippets
    /// is allowed. Off by default: it issues same-process requests to
    /// arbitrary extracted third-party URLs.
    pub snippet_fetch_enabled: bool,
    /// Enrichment only runs when fewer results than this were extracted.
    pub snippet_fetch_budget: usize,
    /// Maximum enrichment fetches per job.
    pub snippet_fetch_max_attempts: usize,
    /// Per-fetch timeout in milliseconds.
    pub snippet_fetch_timeout_ms: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com/search".into(),
            max_results: 10,
            snippet_fetch_enabled: false,
            snippet_fetch_budget: 5,
            snippet_fetch_max_attempts: 3,
            snippet_fetch_timeout_ms: 3_000,
        }
    }
}

/// Maps endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsSection {
    /// Maps search URL prefix; the query is appended as a path segment.
    pub base_url: String,
    /// Default maximum number of entries returned.
    pub default_limit: usize,
    /// Iteration cap for the scroll collector.
    pub scroll_max_passes: usize,
    /// Settle pause between scroll passes in milliseconds.
    pub scroll_settle_ms: u64,
}

impl Default for MapsSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com/maps/search".into(),
            default_limit: 20,
            scroll_max_passes: 12,
            scroll_settle_ms: 700,
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pin_single_identity() {
        let cfg = LanternConfig::default();
        assert_eq!(cfg.browser.concurrency, 1);
        assert!(!cfg.browser.allow_eval);
        assert!(!cfg.search.snippet_fetch_enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: LanternConfig = toml::from_str(
            r#"
            [browser]
            headless = false
            concurrency = 2
            "#,
        )
        .unwrap();
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.concurrency, 2);
        assert_eq!(cfg.browser.navigation_timeout_ms, 30_000);
        assert_eq!(cfg.search.max_results, 10);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = LanternConfig::default();
        let raw = toml::to_string(&cfg).unwrap();
        let back: LanternConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.maps.scroll_max_passes, cfg.maps.scroll_max_passes);
        assert_eq!(back.browser.locale, cfg.browser.locale);
    }
}
