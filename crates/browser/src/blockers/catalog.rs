//! Selector and phrase catalogs for blocker classification and extraction.
//!
//! Google rotates its result markup regularly; the search/snippet selector
//! lists carry several generations of class names and are matched in order.
//! Bump [`CATALOG_VERSION`] when entries change so logs can attribute
//! classification drift to a catalog update.

pub const CATALOG_VERSION: &str = "2026-08";

/// Elements that identify a cookie/consent interstitial.
pub const COOKIE_SELECTORS: &[&str] = &[
    "#onetrust-banner-sdk",
    "#onetrust-consent-sdk",
    "#CybotCookiebotDialog",
    "#L2AGLb",
    "button#W0wltc",
    "form[action*='consent.google.com']",
    "div[aria-modal='true'][aria-label*='consent' i]",
    "#cookie-banner",
    ".cookie-consent",
    ".cc-window.cc-banner",
    "#gdpr-banner",
    "#truste-consent-track",
];

/// Body-text phrases that identify a cookie/consent interstitial.
/// Matched case-insensitively against the visible page text.
pub const COOKIE_PHRASES: &[&str] = &[
    "accept all cookies",
    "before you continue",
    "we use cookies",
    "this site uses cookies",
    "cookie settings",
    "consent to the use of cookies",
    "manage cookie preferences",
];

/// Elements that identify a CAPTCHA or bot challenge.
pub const CAPTCHA_SELECTORS: &[&str] = &[
    "form[action*='/sorry/']",
    "#recaptcha",
    ".g-recaptcha",
    "#captcha-form",
    "#challenge-form",
    "#challenge-running",
    "#cf-challenge-running",
    "div[class*='turnstile']",
    "#px-captcha",
    "iframe[title*='challenge' i]",
];

/// Body-text phrases that identify a CAPTCHA or bot challenge.
pub const CAPTCHA_PHRASES: &[&str] = &[
    "unusual traffic",
    "verify you are human",
    "i'm not a robot",
    "are you a robot",
    "complete the security check",
    "checking your browser",
    "enable javascript and cookies to continue",
    "our systems have detected",
];

/// Iframe source substrings that identify an embedded challenge widget.
pub const CHALLENGE_FRAME_PATTERNS: &[&str] = &[
    "google.com/recaptcha",
    "recaptcha.net",
    "hcaptcha.com",
    "challenges.cloudflare.com",
    "arkoselabs.com",
    "funcaptcha.com",
    "geo.captcha-delivery.com",
];

/// Raw-HTML substrings that identify challenge markup even before the
/// widget renders.
pub const CHALLENGE_MARKUP: &[&str] = &["g-recaptcha", "cf-turnstile", "data-sitekey", "grecaptcha.execute"];

/// Organic result containers, across several markup generations.
pub const SEARCH_RESULT_SELECTORS: &[&str] = &[".tF2Cxc", ".Gx5Zad", ".kvH3mc", ".Ww4FFb"];

/// Snippet containers inside a result card, in preference order.
pub const SNIPPET_SELECTORS: &[&str] = &[".VwiC3b", ".yXK7lf", ".MUxGbd span", ".st"];

/// Data attributes that sometimes carry snippet text directly.
pub const SNIPPET_DATA_ATTRS: &[&str] = &["data-sncf", "data-content-feature"];

/// Containers that mark a card as a video result (excluded from organics).
pub const VIDEO_CARD_SELECTORS: &[&str] = &["video-voyager", ".RzdJxc", ".dFd2Tb", ".iHxmLe"];

/// Containers for the AI-generated answer block at the top of results.
pub const AI_OVERVIEW_SELECTORS: &[&str] = &["div[data-mcpr]", ".LT6XE", ".WaaZC", "#m-x-content"];

/// The top-stories carousel and the headline links inside it.
pub const TOP_STORIES_CONTAINER_SELECTORS: &[&str] = &["g-section-with-header", ".yG4QQe", ".F8yfEe"];
pub const TOP_STORIES_LINK_SELECTOR: &str = "a[href^='http']";

/// Google Maps results panel.
pub const MAPS_FEED_SELECTOR: &str = "div[role='feed']";
pub const MAPS_CARD_SELECTOR: &str = "a[href*='/maps/place/']";
