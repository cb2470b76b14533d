use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

pub const USAGE_TOPIC: &str = "diskwatch/nodes/disk-usage@v1";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default)]
    pub http: HttpConf,
    #[serde(default = "default_preferences_file")]
    pub preferences_file: String,
    /// Vues créées au démarrage (ex: un panneau par dashboard)
    #[serde(default)]
    pub views: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub bind: String,
    pub api_key: Option<String>,
}

fn default_topic() -> String {
    USAGE_TOPIC.into()
}

fn default_client_id() -> String {
    "diskwatch-kernel".into()
}

fn default_preferences_file() -> String {
    "./data/preferences.json".into()
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: default_topic(),
            client_id: default_client_id(),
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            api_key: None,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            http: HttpConf::default(),
            preferences_file: default_preferences_file(),
            views: Vec::new(),
        }
    }
}

impl KernelConfig {
    /// Clé API : config d'abord, puis DISKWATCH_API_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        self.http
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("DISKWATCH_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn read_config(path: impl AsRef<Path>) -> Result<KernelConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    parse_config(&txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("DISKWATCH_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        warn!(%path, "no kernel config found, using defaults");
        return KernelConfig::default();
    }
    read_config(&path).await.unwrap_or_else(|e| {
        warn!(%path, "config invalide: {e}");
        KernelConfig::default()
    })
}
