use std::path::{Path, PathBuf};

use {
    thiserror::Error,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::LanternConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["lantern.toml", "lantern.yaml", "lantern.yml", "lantern.json"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<LanternConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./lantern.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/lantern/lantern.{toml,yaml,yml,json}` (user-global)
///
/// Returns `LanternConfig::default()` if no config file is found.
pub fn discover_and_load() -> LanternConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    LanternConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/lantern/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/lantern/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lantern").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lantern.toml")
}

/// Serialize `config` to TOML and write it to the user-global config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &LanternConfig) -> Result<PathBuf, ConfigError> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
    }
    let toml_str = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.clone(),
        message: e.to_string(),
    })?;
    std::fs::write(&path, toml_str).map_err(|source| ConfigError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> Result<LanternConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let parsed = match ext {
        "toml" => toml::from_str(raw).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.toml");
        std::fs::write(&path, "[browser]\nheadless = false\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert!(!cfg.browser.headless);
        // Untouched sections fall back to defaults.
        assert_eq!(cfg.search.max_results, 10);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.json");
        std::fs::write(&path, r#"{"maps": {"default_limit": 3}}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.maps.default_limit, 3);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.ini");
        std::fs::write(&path, "x=1").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/definitely/not/here/lantern.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.toml");
        std::fs::write(&path, "browser = 42\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("lantern.toml"));
    }
}
