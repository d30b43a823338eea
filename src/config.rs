// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct LapiConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub machine_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiemConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub base_url: String,
    pub token_id: String,
    pub token_secret: String,
    pub set_name: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_family() -> String {
    "ip".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    pub table: String,
    pub chain: String,
    pub set_name: String,
    #[serde(default = "default_family")]
    pub family: String,
}

fn default_sync_interval() -> u64 {
    10
}

fn default_summary_every_n() -> u64 {
    10
}

fn default_metrics_endpoint() -> SocketAddr {
    "0.0.0.0:9898".parse().unwrap()
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Process-wide configuration, assembled once at startup and shared
/// read-only (`Arc<Config>`) with every component.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_summary_every_n")]
    pub metrics_summary_every_n_ticks: u64,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub lapi: Option<LapiConfig>,
    #[serde(default)]
    pub siem: Option<SiemConfig>,
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub local: Option<LocalConfig>,
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: SocketAddr,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Config {
    /// Loads configuration from a TOML file at `path`, then applies
    /// `BANWARDEN_`-prefixed environment overrides (double underscore
    /// separates nested keys, e.g. `BANWARDEN_CLUSTER__BASE_URL`).
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(
                config::Environment::with_prefix("BANWARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        let raw = builder
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let cfg: Config = raw
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Startup validation, per §4.7/§4.4 of the design: fatal, never
    /// retried.
    pub fn validate(&self) -> Result<()> {
        if let Some(lapi) = &self.lapi {
            validate_url("lapi.url", &lapi.url)?;
            if lapi.api_key.trim().is_empty() {
                return Err(EngineError::Configuration(
                    "lapi.api_key must not be empty".to_string(),
                ));
            }
        }
        if self.sync_interval_seconds < 10 {
            return Err(EngineError::Configuration(
                "sync_interval_seconds must be >= 10".to_string(),
            ));
        }
        validate_url("cluster.base_url", &self.cluster.base_url)?;
        if let Some(siem) = &self.siem {
            validate_url("siem.url", &siem.url)?;
        }
        Ok(())
    }
}

/// Non-empty, well-formed URL check shared by every endpoint field.
/// Parsing through `url::Url` catches malformed endpoints (missing
/// scheme, stray whitespace) that a bare emptiness check would miss.
fn validate_url(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Configuration(format!(
            "{field} must not be empty"
        )));
    }
    url::Url::parse(value)
        .map_err(|e| EngineError::Configuration(format!("{field} is not a valid URL: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
        [cluster]
        base_url = "https://pve.example.com:8006/api2/json"
        token_id = "root@pam!banwarden"
        token_secret = "secret"
        set_name = "blacklist"
        "#
        .to_string()
    }

    #[test]
    fn rejects_short_sync_interval() {
        let mut toml = base_toml();
        toml.push_str("sync_interval_seconds = 5\n");
        let raw = config::Config::builder()
            .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_lapi_key() {
        let mut toml = base_toml();
        toml.push_str(
            r#"
            [lapi]
            url = "https://lapi.example.com"
            api_key = ""
            "#,
        );
        let raw = config::Config::builder()
            .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_malformed_lapi_url() {
        let mut toml = base_toml();
        toml.push_str(
            r#"
            [lapi]
            url = "not-a-url"
            api_key = "key"
            "#,
        );
        let raw = config::Config::builder()
            .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_minimal_config() {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(&base_toml(), config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: Config = raw.try_deserialize().unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sync_interval_seconds, 10);
        assert_eq!(cfg.metrics_summary_every_n_ticks, 10);
    }
}
