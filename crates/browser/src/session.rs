//! Session lifecycle management for the single warm browser.
//!
//! Exactly one browser session exists per process. It is launched lazily on
//! first demand against a persistent profile directory, probed for liveness
//! before every job, and relaunched on the next acquire after a crash or an
//! explicit reset. The session carries one page per configured concurrency
//! slot; jobs check a page out through [`SessionManager::acquire`] and give
//! it back with [`SessionManager::release`], so two in-flight jobs can share
//! the browser and its profile but never a page.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use {
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig, Page,
        cdp::browser_protocol::{
            emulation::SetDeviceMetricsOverrideParams, page::AddScriptToEvaluateOnNewDocumentParams,
        },
        handler::viewport::Viewport,
    },
    futures::StreamExt,
    lantern_config::BrowserSection,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    detect,
    error::{BrowserError, Context, Result},
};

/// Fingerprint-hiding script installed before any document loads.
/// Applied at every (re)launch, never per job.
const STEALTH_INIT_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
if (navigator.permissions && navigator.permissions.query) {
    const originalQuery = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (parameters) => (
        parameters && parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}
"#;

/// Observable lifecycle state of the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Crashed,
    Resetting,
}

/// A checked-out page slot of the live session.
///
/// Each handle owns one slot until it is given back through
/// [`SessionManager::release`], so no two in-flight jobs ever drive the
/// same page. The generation identifies which launch the handle belongs
/// to; a handle that outlives a reset carries a stale generation and its
/// crash reports and release are ignored.
pub struct LiveHandle {
    pub page: Page,
    pub generation: u64,
}

struct LiveSession {
    browser: Browser,
    free: Vec<Page>,
    generation: u64,
    created_at: Instant,
}

struct Slot {
    state: SessionState,
    session: Option<LiveSession>,
}

/// Single-owner manager for the shared browser session.
pub struct SessionManager {
    config: BrowserSection,
    profile_dir: PathBuf,
    slot: Mutex<Slot>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(config: BrowserSection) -> Self {
        let profile_dir = config
            .profile_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(default_profile_dir);

        Self {
            config,
            profile_dir,
            slot: Mutex::new(Slot {
                state: SessionState::Uninitialized,
                session: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// The persistent profile directory (created on first launch, never deleted).
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == SessionState::Ready
    }

    /// Check a free page slot out of the READY session, lazily launching
    /// from UNINITIALIZED or CRASHED. Callers block on the internal lock
    /// while a reset or relaunch is in flight. Fails when every slot is
    /// already in flight, which cannot happen to callers going through the
    /// queue (the worker count equals the slot count).
    pub async fn acquire(&self) -> Result<LiveHandle> {
        let mut slot = self.slot.lock().await;

        if slot.state == SessionState::Ready {
            let popped = slot
                .session
                .as_mut()
                .map(|sess| (sess.free.pop(), sess.generation));
            if let Some((maybe_page, generation)) = popped {
                match maybe_page {
                    Some(page) => {
                        let handle = LiveHandle { page, generation };
                        if self.probe(&handle).await {
                            return Ok(handle);
                        }
                        warn!(generation, "liveness probe failed, discarding dead session");
                        Self::teardown(&mut slot).await;
                        slot.state = SessionState::Crashed;
                    },
                    None => {
                        return Err(BrowserError::SessionUnavailable(
                            "all session slots are checked out".into(),
                        ));
                    },
                }
            }
        }

        slot.state = SessionState::Resetting;
        match self.launch().await {
            Ok(mut sess) => match sess.free.pop() {
                Some(page) => {
                    let handle = LiveHandle {
                        page,
                        generation: sess.generation,
                    };
                    slot.session = Some(sess);
                    slot.state = SessionState::Ready;
                    Ok(handle)
                },
                None => {
                    slot.state = SessionState::Uninitialized;
                    Err(BrowserError::SessionUnavailable(
                        "launch produced no page slots".into(),
                    ))
                },
            },
            Err(e) => {
                slot.state = SessionState::Uninitialized;
                Err(BrowserError::SessionUnavailable(e.to_string()))
            },
        }
    }

    /// Give a checked-out page back to its slot. A stale handle from a
    /// previous launch is dropped instead.
    pub async fn release(&self, handle: LiveHandle) {
        let mut slot = self.slot.lock().await;
        match slot.session.as_mut() {
            Some(sess) if sess.generation == handle.generation => sess.free.push(handle.page),
            _ => debug!(generation = handle.generation, "stale handle dropped on release"),
        }
    }

    /// Cheap liveness check for a checked-out handle.
    pub async fn probe(&self, handle: &LiveHandle) -> bool {
        handle.page.url().await.is_ok()
    }

    /// Tear down the current session (idempotent) and return to
    /// UNINITIALIZED; the next `acquire()` relaunches.
    ///
    /// Safe to call while a job holds the old handle: that job keeps its
    /// clone of the dead page and fails against it on its own.
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        if slot.session.is_none() {
            debug!("reset with no live session");
            slot.state = SessionState::Uninitialized;
            return;
        }
        slot.state = SessionState::Resetting;
        Self::teardown(&mut slot).await;
        slot.state = SessionState::Uninitialized;
        info!("session reset");
    }

    /// A job reports that the connection behind its handle died mid-use.
    /// Only marks CRASHED when the generation matches the current session;
    /// stale reports from pre-reset handles are ignored.
    pub async fn mark_crashed(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        match &slot.session {
            Some(sess) if sess.generation == generation => {
                warn!(generation, "session reported dead mid-use");
                Self::teardown(&mut slot).await;
                slot.state = SessionState::Crashed;
            },
            _ => debug!(generation, "stale crash report ignored"),
        }
    }

    /// Age of the current session, if one is live.
    pub async fn session_age(&self) -> Option<Duration> {
        let slot = self.slot.lock().await;
        slot.session.as_ref().map(|s| s.created_at.elapsed())
    }

    async fn teardown(slot: &mut Slot) {
        if let Some(sess) = slot.session.take() {
            let mut browser = sess.browser;
            if let Err(e) = browser.close().await {
                debug!(error = %e, "browser close failed during teardown");
            }
            // The child process is reaped when the browser is dropped.
            drop(browser);
            debug!(generation = sess.generation, "session torn down");
        }
    }

    async fn launch(&self) -> Result<LiveSession> {
        std::fs::create_dir_all(&self.profile_dir).with_context(|| {
            format!("create profile directory {}", self.profile_dir.display())
        })?;

        let executable = detect::detect_browser(self.config.chrome_path.as_deref())
            .ok_or_else(|| BrowserError::LaunchFailed(detect::install_instructions()))?;

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(&executable)
            .user_data_dir(&self.profile_dir)
            .viewport(Viewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
                device_scale_factor: Some(self.config.device_scale_factor),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms));

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder.arg(format!("--lang={}", self.config.locale));

        if let Some(ref ua) = self.config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox");

        let cdp_config = builder.build().map_err(|e| {
            BrowserError::LaunchFailed(format!("failed to build browser config: {e}"))
        })?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(|e| {
            BrowserError::LaunchFailed(format!(
                "browser launch failed: {e}\n\n{}",
                detect::install_instructions()
            ))
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Drain browser events for the lifetime of this session.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!(generation, ?event, "browser event");
            }
            debug!(generation, "browser event handler exited");
        });

        // One page per queue worker slot, so concurrent jobs never share
        // a page even though they share the browser and its profile.
        let slots = self.config.concurrency.max(1);
        let mut free = Vec::with_capacity(slots);
        for _ in 0..slots {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            // Stealth init must be in place before the first real navigation.
            let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(STEALTH_INIT_JS)
                .build()
                .map_err(BrowserError::Cdp)?;
            page.execute(stealth)
                .await
                .map_err(|e| BrowserError::Cdp(e.to_string()))?;

            // Browser-level viewport may not apply to already-open pages.
            let viewport_cmd = SetDeviceMetricsOverrideParams::builder()
                .width(self.config.viewport_width)
                .height(self.config.viewport_height)
                .device_scale_factor(self.config.device_scale_factor)
                .mobile(false)
                .build()
                .map_err(BrowserError::Cdp)?;
            if let Err(e) = page.execute(viewport_cmd).await {
                warn!(generation, error = %e, "failed to set page viewport");
            }
            free.push(page);
        }

        info!(
            generation,
            slots,
            profile = %self.profile_dir.display(),
            viewport_width = self.config.viewport_width,
            viewport_height = self.config.viewport_height,
            locale = %self.config.locale,
            "launched browser session"
        );

        Ok(LiveSession {
            browser,
            free,
            generation,
            created_at: Instant::now(),
        })
    }
}

fn default_profile_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "lantern")
        .map(|d| d.data_dir().join("profile"))
        .unwrap_or_else(|| std::env::temp_dir().join("lantern-profile"))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_profile(dir: &Path) -> SessionManager {
        SessionManager::new(BrowserSection {
            profile_dir: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_profile(dir.path());
        assert_eq!(manager.state().await, SessionState::Uninitialized);
        assert!(!manager.is_ready().await);
        assert!(manager.session_age().await.is_none());
    }

    #[tokio::test]
    async fn reset_is_idempotent_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_profile(dir.path());
        manager.reset().await;
        manager.reset().await;
        assert_eq!(manager.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn stale_crash_report_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_profile(dir.path());
        // No session exists; report must be a no-op.
        manager.mark_crashed(42).await;
        assert_eq!(manager.state().await, SessionState::Uninitialized);
    }

    #[test]
    fn explicit_profile_dir_wins() {
        let manager = SessionManager::new(BrowserSection {
            profile_dir: Some("/var/lib/lantern/profile".into()),
            ..Default::default()
        });
        assert_eq!(
            manager.profile_dir(),
            Path::new("/var/lib/lantern/profile")
        );
    }

    #[tokio::test]
    #[ignore] // Needs an installed Chromium.
    async fn concurrency_slots_hold_distinct_pages() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(BrowserSection {
            profile_dir: Some(dir.path().to_string_lossy().into_owned()),
            concurrency: 2,
            ..Default::default()
        });

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();
        assert_eq!(first.generation, second.generation);
        assert_ne!(first.page.target_id(), second.page.target_id());

        // Both slots are in flight; a third checkout must not hand out a
        // page another job is driving.
        assert!(manager.acquire().await.is_err());

        manager.release(first).await;
        assert!(manager.acquire().await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Needs an installed Chromium.
    async fn reset_then_acquire_returns_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_profile(dir.path());

        let first = manager.acquire().await.unwrap();
        manager.reset().await;
        let second = manager.acquire().await.unwrap();

        assert_ne!(first.generation, second.generation);
    }
}
