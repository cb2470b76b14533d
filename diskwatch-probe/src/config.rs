//! Probe configuration
//!
//! Handles:
//! - MQTT broker settings
//! - Node identity and sampling interval
//! - Cross-platform storage (`<config_dir>/diskwatch-probe/config.toml`)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const USAGE_TOPIC: &str = "diskwatch/nodes/disk-usage@v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub mqtt: MqttConfig,
    pub probe: ProbeSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub node_id: String,
    pub interval_secs: u64,
    /// Mount points reported in each event; "/" is the one the kernel displays
    pub mounts: Vec<String>,
}

fn default_topic() -> String {
    USAGE_TOPIC.to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "127.0.0.1".to_string(),
                broker_port: 1883,
                client_id: None,
                keep_alive_secs: 30,
                topic: default_topic(),
            },
            probe: ProbeSettings {
                node_id: uuid::Uuid::new_v4().to_string(),
                interval_secs: 10,
                mounts: vec!["/".to_string()],
            },
        }
    }
}

impl ProbeConfig {
    /// Load config from the OS-specific location, creating it on first run
    /// so that the generated node id stays stable across restarts.
    pub async fn load_or_init() -> Result<Self> {
        let path = Self::config_file_path()?;
        if path.exists() {
            return Self::load_from(&path).await;
        }
        let config = Self::default();
        config.save_to(&path).await?;
        info!("First run: generated node id {} ({})", config.probe.node_id, path.display());
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("diskwatch-probe");
        path.push("config.toml");
        Ok(path)
    }

    pub fn client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| format!("diskwatch-probe-{}", self.probe.node_id))
    }
}
