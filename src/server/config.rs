use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::alerting::thresholds::AlertThresholds;
use crate::models::{Site, SiteStatus};

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Sampling cadence in milliseconds. One tick samples every online site.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Tolerance subtracted from the tick interval when a client decides
    /// whether to accept an update early.
    #[serde(default = "default_client_throttle_slack_ms")]
    pub client_throttle_slack_ms: u64,

    /// Per-connection outbound send budget. A connection that cannot take
    /// a message within this window is treated as disconnected.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default)]
    pub thresholds: AlertThresholds,

    #[serde(default = "default_sites")]
    pub sites: Vec<Site>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    tick_interval_ms: Option<u64>,
    client_throttle_slack_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
    thresholds: Option<AlertThresholds>,
    sites: Option<Vec<Site>>,
}

// Environment overrides cover scalar keys only; thresholds and the site
// seed list are file-only.
#[derive(Deserialize, Default, Debug)]
struct EnvOverrides {
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    tick_interval_ms: Option<u64>,
    client_throttle_slack_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tick_interval_ms() -> u64 {
    600_000
}

fn default_client_throttle_slack_ms() -> u64 {
    30_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_sites() -> Vec<Site> {
    vec![
        Site {
            id: "site-1".to_string(),
            name: "Riverfront Solar Park".to_string(),
            status: SiteStatus::Online,
        },
        Site {
            id: "site-2".to_string(),
            name: "Industrial Power Hub".to_string(),
            status: SiteStatus::Online,
        },
        Site {
            id: "site-3".to_string(),
            name: "Smart Grid Campus".to_string(),
            status: SiteStatus::Maintenance,
        },
    ]
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            } else {
                PartialServerConfig::default()
            }
        } else {
            PartialServerConfig::default()
        };

        // 2. Load from environment variables
        let env_config: EnvOverrides = envy::from_env::<EnvOverrides>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        let final_config = ServerConfig {
            jwt_secret: env_config
                .jwt_secret
                .or(file_config.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            tick_interval_ms: env_config
                .tick_interval_ms
                .or(file_config.tick_interval_ms)
                .unwrap_or_else(default_tick_interval_ms),
            client_throttle_slack_ms: env_config
                .client_throttle_slack_ms
                .or(file_config.client_throttle_slack_ms)
                .unwrap_or_else(default_client_throttle_slack_ms),
            send_timeout_ms: env_config
                .send_timeout_ms
                .or(file_config.send_timeout_ms)
                .unwrap_or_else(default_send_timeout_ms),
            thresholds: file_config.thresholds.unwrap_or_default(),
            sites: file_config.sites.unwrap_or_else(default_sites),
        };

        Ok(final_config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn client_throttle_slack(&self) -> Duration {
        Duration::from_millis(self.client_throttle_slack_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_values() {
        let config: ServerConfig = toml::from_str("jwt_secret = \"test-secret\"").unwrap();
        assert_eq!(config.tick_interval_ms, 600_000);
        assert_eq!(config.client_throttle_slack_ms, 30_000);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.sites.len(), 3);
        assert_eq!(config.sites.iter().filter(|s| s.is_online()).count(), 2);
    }

    #[test]
    fn file_values_override_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            jwt_secret = "test-secret"
            tick_interval_ms = 1000
            client_throttle_slack_ms = 100

            [[sites]]
            id = "plant-a"
            name = "Plant A"
            status = "online"
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites[0].id, "plant-a");
    }
}
