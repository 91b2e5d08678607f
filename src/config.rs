//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a missing file or section still yields
//! a usable client pointed at a local backend. Secrets (the API token)
//! are referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub tracker: TrackerConfig,
    pub pricing: PricingConfig,
    pub notifications: NotificationConfig,
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Name of the env var holding a bearer token, if the backend wants one.
    pub api_token_env: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            user_agent: "realty-crm/0.1.0".to_string(),
            api_token_env: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub heartbeat_interval_secs: u64,
    pub max_session_secs: u32,
    pub inactivity_timeout_secs: u64,
    /// Upper bound on seconds reported by a single heartbeat.
    pub max_report_secs: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            max_session_secs: 180,
            inactivity_timeout_secs: 30,
            max_report_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    /// Installment start used when the backend has no per-complex date.
    pub installment_start: NaiveDate,
    pub installment_months: u32,
    /// Share of the total deferred to the last hybrid payment.
    pub hybrid_final_percent: u8,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            installment_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap_or_default(),
            installment_months: 36,
            hybrid_final_percent: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub dismiss_after_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { dismiss_after_secs: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PreferencesConfig {
    pub path: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: "realty_crm_prefs.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            anyhow::bail!("backend.base_url must not be empty");
        }
        if self.tracker.heartbeat_interval_secs == 0 {
            anyhow::bail!("tracker.heartbeat_interval_secs must be positive");
        }
        if self.pricing.hybrid_final_percent >= 100 {
            anyhow::bail!("pricing.hybrid_final_percent must be below 100");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The backend API token, if one is configured and present.
    pub fn api_token(&self) -> Option<SecretString> {
        let env = self.backend.api_token_env.as_deref()?;
        Self::resolve_env(env).ok().map(SecretString::new)
    }
}
