//! Request and response shapes for the gateway surface.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{
    blockers::BlockerVerdict,
    error::{BrowserError, Result},
    extract::{
        fields::FieldSpec,
        search::{SearchResult, TopStory},
    },
};

/// Caller-supplied JavaScript to evaluate on the landed page.
/// Only honored when the operator has enabled `browser.allow_eval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSpec {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Navigate-and-extract against an arbitrary URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Selector to soft-wait for before classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_selector: Option<String>,
    /// Selectors whose total absence marks the page as blocked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_selectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<EvalSpec>,
    #[serde(default)]
    pub include_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

/// Web-search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Maps place query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Scroll the feed to collect beyond the first screenful.
    #[serde(default = "default_true")]
    pub scroll: bool,
    #[serde(default)]
    pub include_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Terminal status of a job that produced output. Infrastructure failures
/// surface as [`BrowserError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Blocked,
}

/// Uniform job output across fetch, search, and maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    /// Unix epoch milliseconds at completion.
    pub timestamp: u64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub status: JobStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<BlockerVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_stories: Option<Vec<TopStory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl JobOutput {
    pub fn completed(url: impl Into<String>) -> Self {
        Self::base(url, JobStatus::Completed)
    }

    pub fn blocked(url: impl Into<String>, verdict: BlockerVerdict) -> Self {
        let mut out = Self::base(url, JobStatus::Blocked);
        out.blocked = true;
        out.blocker = Some(verdict);
        out
    }

    fn base(url: impl Into<String>, status: JobStatus) -> Self {
        Self {
            timestamp: epoch_millis(),
            url: url.into(),
            final_url: None,
            status,
            duration_ms: 0,
            blocked: false,
            blocker: None,
            extracted: None,
            evaluated: None,
            results: None,
            top_stories: None,
            ai_overview: None,
            html: None,
        }
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn with_extracted(mut self, value: Value) -> Self {
        self.extracted = Some(value);
        self
    }

    pub fn with_evaluated(mut self, value: Value) -> Self {
        self.evaluated = Some(value);
        self
    }

    pub fn with_search_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = Some(Value::Array(
            results
                .into_iter()
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
        ));
        self
    }

    pub fn with_maps_entries(mut self, entries: Vec<crate::extract::maps::MapsEntry>) -> Self {
        self.results = Some(Value::Array(
            entries
                .into_iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect(),
        ));
        self
    }

    pub fn with_top_stories(mut self, stories: Vec<TopStory>) -> Self {
        if !stories.is_empty() {
            self.top_stories = Some(stories);
        }
        self
    }

    pub fn with_ai_overview(mut self, overview: Option<String>) -> Self {
        self.ai_overview = overview;
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Gateway health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Whether the warm session is currently live.
    pub ready: bool,
    /// Jobs waiting in the queue.
    pub queue_size: usize,
    /// Jobs currently executing.
    pub pending: usize,
}

/// Validate a caller-supplied URL before it reaches the queue.
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BrowserError::InvalidRequest("empty url".into()));
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| BrowserError::InvalidRequest(format!("invalid url {trimmed:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(BrowserError::InvalidRequest(format!(
            "unsupported scheme {other:?}, only http and https are allowed"
        ))),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert!(validate_url("https://example.com/a?b=c").is_ok());
        assert!(validate_url("  http://example.com  ").is_ok());
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("chrome://settings").is_err());
        assert!(validate_url("").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn blocked_output_sets_flag_and_verdict() {
        use crate::blockers::BlockerKind;

        let verdict = BlockerVerdict {
            kind: BlockerKind::Cookie,
            reason: "test".into(),
            evidence: Default::default(),
            missing_required: false,
        };
        let out = JobOutput::blocked("https://example.com", verdict);
        assert_eq!(out.status, JobStatus::Blocked);
        assert!(out.blocked);
        assert!(out.blocker.is_some());
    }

    #[test]
    fn completed_output_serializes_without_empty_fields() {
        let out = JobOutput::completed("https://example.com");
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("blocker"));
        assert!(!json.contains("\"blocked\""));
        assert!(!json.contains("html"));
        assert!(json.contains("\"status\":\"completed\""));
    }

    #[test]
    fn empty_result_list_stays_completed() {
        let out = JobOutput::completed("https://example.com").with_search_results(vec![]);
        assert_eq!(out.status, JobStatus::Completed);
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"results\":[]"));
    }

    #[test]
    fn maps_request_scrolls_by_default() {
        let req: MapsRequest = serde_json::from_str(r#"{"query": "coffee"}"#).unwrap();
        assert!(req.scroll);
    }
}
