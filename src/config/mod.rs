//! Configuration module for the image gateway

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::admission::PlanLimit;

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub plans: PlanSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Largest accepted image upload
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize { 20 * 1024 * 1024 }

/// API key allow-list. Empty disables authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub allowed_api_keys: Vec<String>,
}

/// Plan tiers: which key is on which plan, and what each plan allows.
///
/// Stored as lists rather than tables so API keys and plan names keep
/// their exact case through every config source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanSettings {
    #[serde(default)]
    pub keys: Vec<KeyAssignment>,
    #[serde(default)]
    pub tiers: Vec<PlanTier>,
}

/// One API key bound to a plan name
#[derive(Debug, Clone, Deserialize)]
pub struct KeyAssignment {
    pub key: String,
    pub plan: String,
}

/// A named plan and its limits
#[derive(Debug, Clone, Deserialize)]
pub struct PlanTier {
    pub name: String,
    #[serde(flatten)]
    pub limit: PlanLimit,
}

impl PlanSettings {
    /// API key -> plan name
    pub fn key_plans(&self) -> HashMap<String, String> {
        self.keys
            .iter()
            .map(|a| (a.key.clone(), a.plan.clone()))
            .collect()
    }

    /// Plan name -> limits. Later duplicates win.
    pub fn plan_limits(&self) -> HashMap<String, PlanLimit> {
        self.tiers
            .iter()
            .map(|t| (t.name.clone(), t.limit))
            .collect()
    }
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with IMAGEGATE_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // IMAGEGATE_SERVER__PORT, IMAGEGATE_AUTH__ALLOWED_API_KEYS, etc.
            .add_source(
                Environment::with_prefix("IMAGEGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.allowed_api_keys")
                    .try_parsing(true)
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: None,
                max_body_bytes: default_max_body_bytes(),
            },
            auth: AuthSettings::default(),
            plans: PlanSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_settings_deserialize() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [auth]
            allowed_api_keys = ["k1", "k2"]

            [[plans.keys]]
            key = "k1"
            plan = "Pro"

            [[plans.keys]]
            key = "K1"
            plan = "Free"

            [[plans.tiers]]
            name = "Pro"
            requests_per_minute = 120
            daily_limit = 10000
        "#;

        let settings: Settings = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.max_body_bytes, default_max_body_bytes());
        assert_eq!(settings.auth.allowed_api_keys, vec!["k1", "k2"]);

        let key_plans = settings.plans.key_plans();
        assert_eq!(key_plans.get("k1").map(String::as_str), Some("Pro"));
        assert_eq!(key_plans.get("K1").map(String::as_str), Some("Free"));
        assert_eq!(settings.plans.plan_limits()["Pro"], PlanLimit::new(120, 10000));
    }

    #[test]
    fn test_default_settings_disable_auth() {
        let settings = Settings::default();
        assert!(settings.auth.allowed_api_keys.is_empty());
        assert!(settings.plans.plan_limits().is_empty());
    }
}
