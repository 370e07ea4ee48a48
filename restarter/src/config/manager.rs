// File: restarter/src/config/manager.rs
use super::Config;
use crate::errors::ConfigError;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path).await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config = Self::parse(&main_config_content)?;

        // A relative maintenance path is resolved against the config directory
        if let Some(path) = config.maintenance_config_path.take() {
            let resolved = if Path::new(&path).is_absolute() {
                path
            } else {
                format!("{}/{}", config_dir, path)
            };
            config.maintenance_config_path = Some(resolved);
        }

        info!(
            "Loaded config: {} cluster filter(s), maintenance config: {}, suspended-only: {}, dry-run: {}",
            config.clusters.len(),
            config.maintenance_config_path.as_deref().unwrap_or("none"),
            config.only_on_suspended_nodes,
            config.dry_run
        );

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.pod_ready_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pod_ready_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.max_concurrent_clusters == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_clusters".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if config.sql.password.is_some() && config.sql.username.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "sql.password".to_string(),
                reason: "requires sql.username".to_string(),
            });
        }
        Ok(())
    }
}
