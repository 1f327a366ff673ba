/// Runtime configuration.
///
/// `ServerConfig` is read from the environment by the server binary.
/// `GridConfig` tunes the client-side grid: page size, row height estimate,
/// overscan and the distance from the bottom that triggers the next page.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::query::MAX_PAGE_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seed a demo base and table on startup
    pub seed_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            seed_demo: true,
        }
    }
}

impl ServerConfig {
    /// Read `GRIDBASE_HOST` / `HOST`, `GRIDBASE_PORT` / `PORT` and `GRIDBASE_SEED_DEMO`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(*k));

        if let Some(host) = first(&["GRIDBASE_HOST", "HOST"]) {
            config.host = host;
        }
        if let Some(port) = first(&["GRIDBASE_PORT", "PORT"]) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| GridError::Config(format!("PORT must be a number, got '{}'", port)))?;
        }
        if let Some(seed) = first(&["GRIDBASE_SEED_DEMO"]) {
            config.seed_demo = match seed.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(GridError::Config(format!(
                        "GRIDBASE_SEED_DEMO must be a boolean, got '{}'",
                        other
                    )))
                }
            };
        }
        Ok(config)
    }
}

/// Client grid tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Rows requested per page, clamped to the server maximum
    pub page_size: usize,
    /// Row height assumed before a row is measured
    pub estimated_row_height: f64,
    /// Extra rows mounted above and below the viewport
    pub overscan: usize,
    /// Remaining scroll distance below which the next page is requested
    pub fetch_threshold: f64,
    /// Whether measured heights can be trusted; estimates are used otherwise
    pub reliable_measurement: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            page_size: MAX_PAGE_SIZE,
            estimated_row_height: 33.0,
            overscan: 10,
            fetch_threshold: 300.0,
            reliable_measurement: true,
        }
    }
}

impl GridConfig {
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_prefixed_keys_win() {
        let config = from_pairs(&[
            ("HOST", "0.0.0.0"),
            ("GRIDBASE_HOST", "10.0.0.1"),
            ("PORT", "9000"),
            ("GRIDBASE_SEED_DEMO", "off"),
        ])
        .unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 9000);
        assert!(!config.seed_demo);
    }

    #[test]
    fn test_invalid_port() {
        let result = from_pairs(&[("PORT", "eighty")]);
        assert!(matches!(result, Err(GridError::Config(_))));
    }

    #[test]
    fn test_page_size_clamped() {
        let config = GridConfig {
            page_size: 500,
            ..GridConfig::default()
        };
        assert_eq!(config.effective_page_size(), MAX_PAGE_SIZE);
    }
}
