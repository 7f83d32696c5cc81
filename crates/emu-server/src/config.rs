//! Configuration shape and loading.
//!
//! Grounded in the teacher's `rustpress-core::config` (`AppConfig`,
//! `ServerConfig`, `Default` impls, `config` crate layering) and spec.md
//! §6's configuration shape (`Host`/`Port`/optional second port,
//! `LogFile`/`LogToFile`, `QueueAttributeDefaults`, `Topics`, `Queues`).
//! The file is keyed by environment name, selected by the CLI's positional
//! argument, following `original_source/app/cmd/goaws.go`'s
//! `conf.NewConfigLoader(filename, env)`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub port_sns: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            port_sns: None,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn second_address(&self) -> Option<String> {
        self.port_sns.map(|p| format!("{}:{p}", self.host))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub log_to_file: bool,
}

/// The five numeric defaults spec.md §3 names, applied to a queue created
/// without explicit attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueAttributeDefaultsConfig {
    #[serde(default = "defaults::delay_seconds")]
    pub delay_seconds: u32,
    #[serde(default = "defaults::visibility_timeout")]
    pub visibility_timeout: u32,
    #[serde(default = "defaults::maximum_message_size")]
    pub maximum_message_size: u64,
    #[serde(default = "defaults::message_retention_period")]
    pub message_retention_period: u64,
    #[serde(default)]
    pub receive_message_wait_time_seconds: u32,
}

mod defaults {
    pub fn delay_seconds() -> u32 {
        0
    }
    pub fn visibility_timeout() -> u32 {
        30
    }
    pub fn maximum_message_size() -> u64 {
        262_144
    }
    pub fn message_retention_period() -> u64 {
        345_600
    }
}

impl Default for QueueAttributeDefaultsConfig {
    fn default() -> Self {
        Self {
            delay_seconds: defaults::delay_seconds(),
            visibility_timeout: defaults::visibility_timeout(),
            maximum_message_size: defaults::maximum_message_size(),
            message_retention_period: defaults::message_retention_period(),
            receive_message_wait_time_seconds: 0,
        }
    }
}

impl QueueAttributeDefaultsConfig {
    pub fn to_queue_attributes(&self) -> emu_core::model::QueueAttributes {
        emu_core::model::QueueAttributes {
            delay_seconds: self.delay_seconds,
            visibility_timeout: self.visibility_timeout,
            maximum_message_size: self.maximum_message_size,
            message_retention_period: self.message_retention_period,
            receive_message_wait_time_seconds: self.receive_message_wait_time_seconds,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub end_point: Option<String>,
    pub protocol: String,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub filter_policy: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub receive_message_wait_time_seconds: Option<u32>,
    #[serde(default)]
    pub maximum_message_size: Option<u64>,
    #[serde(default)]
    pub visibility_timeout: Option<u32>,
    #[serde(default)]
    pub delay_seconds: Option<u32>,
    #[serde(default)]
    pub fifo_queue: bool,
    #[serde(default)]
    pub redrive_policy: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub queue_attribute_defaults: QueueAttributeDefaultsConfig,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

/// Loads the config file and selects the named environment section,
/// layering `EMU_`-prefixed environment variables over it (teacher's
/// `config::Config` builder pattern; not the hand-rolled `toml::Value`
/// probing the teacher's own `main.rs` uses in one place).
pub fn load(path: &Path, env: &str) -> anyhow::Result<AppConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("EMU").separator("__"));

    let raw: HashMap<String, AppConfig> = builder.build()?.try_deserialize()?;

    raw.get(env).cloned().ok_or_else(|| {
        anyhow::anyhow!("no configuration section named '{env}' in {}", path.display())
    })
}
