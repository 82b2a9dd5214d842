// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./reverie.toml` > `~/.config/reverie/reverie.toml` >
//! `/etc/reverie/reverie.toml` with environment variable overrides via the
//! `REVERIE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ReverieConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/reverie/reverie.toml";

/// Local configuration file, relative to the working directory.
pub const LOCAL_CONFIG_FILE: &str = "reverie.toml";

/// Config sections addressable from environment variables.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "embedding",
    "retrieval",
    "context",
    "memory",
];

/// Path of the per-user config file, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reverie").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/reverie/reverie.toml`
/// 3. `~/.config/reverie/reverie.toml`
/// 4. `./reverie.toml`
/// 5. `REVERIE_*` environment variables
pub fn load_config() -> Result<ReverieConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
pub fn load_config_from_str(toml_content: &str) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider with an explicit section-to-dot mapping.
///
/// `Env::split("_")` would turn `REVERIE_RETRIEVAL_SEMANTIC_WEIGHT` into
/// `retrieval.semantic.weight`; only the first segment names a section.
fn env_provider() -> Env {
    Env::prefixed("REVERIE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key to a dotted config path.
///
/// `retrieval_simple_max_results` maps to `retrieval.simple.max_results`.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        else {
            continue;
        };

        if *section == "retrieval" {
            for tier in ["simple", "medium", "complex"] {
                if let Some(field) = rest.strip_prefix(tier).and_then(|r| r.strip_prefix('_')) {
                    return format!("retrieval.{tier}.{field}");
                }
            }
        }
        return format!("{section}.{rest}");
    }
    key.to_string()
}
