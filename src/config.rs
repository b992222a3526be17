use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Service configuration
///
/// All settings come from the environment so the service stays stateless
/// and deployable without a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of this service, used to build PubSubHubbub callback URLs.
    /// When unset, no hub subscriptions are attempted.
    pub base_url: Option<String>,

    /// Consumer key for the Soundcloud API
    pub soundcloud_consumer_key: Option<String>,

    /// Flattr thing identifier rendered on the index page
    pub flattr_thing: Option<String>,

    /// Hosts this service accepts requests for (empty = all)
    pub allowed_hosts: Vec<String>,

    /// Secret key for signed tokens
    pub secret_key: Option<String>,

    /// Verbose logging
    pub debug: bool,
}

impl Config {
    /// Build the configuration from `MYGPOFS_*` environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: non_empty(std::env::var("BASE_URL").ok()),
            soundcloud_consumer_key: non_empty(
                std::env::var("MYGPOFS_SOUNDCLOUD_CONSUMER_KEY").ok(),
            ),
            flattr_thing: non_empty(std::env::var("MYGPOFS_FLATTR_THING").ok()),
            allowed_hosts: std::env::var("MYGPOFS_ALLOWED_HOSTS")
                .unwrap_or_default()
                .split(';')
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            secret_key: non_empty(std::env::var("MYGPOFS_SECRET_KEY").ok()),
            debug: std::env::var("MYGPOFS_DEBUG").map(|v| v == "True").unwrap_or(false),
        }
    }

    /// Default data directory for the subscription store
    pub fn default_data_dir() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "feedserve")
            .ok_or_else(|| anyhow::anyhow!("Unable to determine data directory"))?;
        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Default bind address
    pub fn default_bind() -> SocketAddr {
        ([127, 0, 0, 1], 8080).into()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            soundcloud_consumer_key: None,
            flattr_thing: None,
            allowed_hosts: Vec::new(),
            secret_key: None,
            debug: false,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.base_url.is_none());
        assert!(config.allowed_hosts.is_empty());
        assert!(!config.debug);
    }

    #[test]
    fn test_non_empty_filters_blank() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
