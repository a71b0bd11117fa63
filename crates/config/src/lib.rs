//! Configuration loading and env substitution.
//!
//! Config files: `lantern.toml`, `lantern.yaml`, or `lantern.json`
//! Searched in `./` then `~/.config/lantern/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{BrowserSection, LanternConfig, MapsSection, SearchSection},
};
