//! Chromium executable discovery and install guidance.

use std::path::PathBuf;

/// Known Chromium-based executable names, searched in PATH order.
/// All of these speak CDP.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "chromium",
    "chromium-browser",
    "msedge",
    "microsoft-edge-stable",
    "brave-browser",
    "vivaldi",
];

/// Locate a Chromium-based browser executable.
///
/// Checks, in order: the configured path, the `CHROME` environment
/// variable, then known executable names in PATH.
pub fn detect_browser(custom_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = custom_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
        tracing::warn!(path, "configured chrome_path does not exist, falling back to discovery");
    }

    if let Ok(path) = std::env::var("CHROME") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    CHROMIUM_EXECUTABLES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Platform-specific install instructions, shown when no browser is found.
pub fn install_instructions() -> String {
    let instructions = if cfg!(target_os = "macos") {
        "  brew install --cask google-chrome"
    } else if cfg!(target_os = "linux") {
        "  Debian/Ubuntu: sudo apt install chromium-browser\n  \
         Fedora:         sudo dnf install chromium\n  \
         Arch:           sudo pacman -S chromium"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else {
        "  Download from https://www.google.com/chrome/"
    };

    format!(
        "No Chromium-based browser found. Install one:\n\n\
         {instructions}\n\n\
         Any Chromium-based browser works (Chrome, Chromium, Edge, Brave, Vivaldi).\n\n\
         Or set the path in config:\n  \
         [browser]\n  \
         chrome_path = \"/path/to/browser\"\n\n\
         Or set the CHROME environment variable."
    )
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_instructions_mention_config_key() {
        let hint = install_instructions();
        assert!(hint.contains("chrome_path"));
        assert!(hint.contains("CHROME"));
    }

    #[test]
    fn custom_path_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-chrome");
        std::fs::write(&fake, "").unwrap();

        let found = detect_browser(fake.to_str());
        assert_eq!(found.unwrap(), fake);
    }

    #[test]
    fn bogus_custom_path_falls_through() {
        // Must not return the nonexistent path itself.
        if let Some(found) = detect_browser(Some("/nonexistent/chrome-for-test")) {
            assert_ne!(found, PathBuf::from("/nonexistent/chrome-for-test"));
        }
    }
}
