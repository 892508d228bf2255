use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

use crate::answers::ReconcilePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "survey.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub cache_database_url: String,
    pub reconcile_policy: ReconcilePolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            cache_database_url: "sqlite://./data/survey_cache.db".into(),
            reconcile_policy: ReconcilePolicy::LargerWins,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_base_url: Option<String>,
    cache_database_url: Option<String>,
    reconcile_policy: Option<ReconcilePolicy>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_CONFIG_PATH), |name| std::env::var(name).ok())
}

/// Defaults, then `path` if it exists and parses, then environment overrides.
/// `APP__*` variables take precedence over their bare counterparts.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileConfig>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.api_base_url {
                    settings.api_base_url = v;
                }
                if let Some(v) = file_cfg.cache_database_url {
                    settings.cache_database_url = v;
                }
                if let Some(v) = file_cfg.reconcile_policy {
                    settings.reconcile_policy = v;
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config: ignoring unparseable file");
            }
        }
    }

    if let Some(v) = env("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("CACHE_DATABASE_URL") {
        settings.cache_database_url = v;
    }
    if let Some(v) = env("APP__CACHE_DATABASE_URL") {
        settings.cache_database_url = v;
    }

    if let Some(v) = env("APP__RECONCILE_POLICY") {
        match v.parse() {
            Ok(policy) => settings.reconcile_policy = policy,
            Err(err) => warn!(error = %err, "config: ignoring APP__RECONCILE_POLICY"),
        }
    }

    settings.cache_database_url = normalize_cache_url(&settings.cache_database_url);
    settings
}

/// Accepts bare paths and `sqlite:path` forms as well as full sqlite URLs.
pub fn normalize_cache_url(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() {
        return ClientSettings::default().cache_database_url;
    }

    if raw.starts_with("sqlite::memory:") || raw.contains("://") {
        return raw.to_string();
    }

    if let Some(path) = raw.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
