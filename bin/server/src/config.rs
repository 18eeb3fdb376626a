//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional `loomwork.toml` in the
//! working directory, overridden by environment variables. Nested keys use
//! `__` as the separator, e.g. `ENGINE__STRICT_INPUTS=true`.

use loomwork_ai::OpenAiConfig;
use loomwork_core::{ModelId, UserId};
use loomwork_integration::BOCHA_ENDPOINT;
use loomwork_workflow::EngineConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Acting user when a request carries no `x-user-id` header.
    #[serde(default = "default_user_id")]
    pub default_user_id: i64,

    /// Snowflake worker id of this process. Must be unique per deployment.
    #[serde(default = "default_worker_id")]
    pub worker_id: u16,

    /// Timeout for crawler requests, in seconds.
    #[serde(default = "default_crawler_timeout_secs")]
    pub crawler_timeout_secs: u64,

    #[serde(default)]
    pub engine: EngineSettings,

    /// Chat models nodes may reference by id.
    #[serde(default)]
    pub models: Vec<ModelSettings>,

    /// Web search provider. Web search nodes fail when absent.
    #[serde(default)]
    pub web_search: Option<WebSearchSettings>,

    #[serde(default)]
    pub files: FileSettings,
}

/// Engine behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSettings {
    /// Fail nodes whose required inputs do not resolve.
    #[serde(default)]
    pub strict_inputs: bool,

    /// Per-node deadline in seconds. No deadline when unset.
    #[serde(default)]
    pub node_timeout_secs: Option<u64>,
}

impl EngineSettings {
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            strict_inputs: self.strict_inputs,
            node_timeout: self.node_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// One chat model backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Id referenced by `modelId` in node data.
    pub id: ModelId,

    #[serde(flatten)]
    pub backend: OpenAiConfig,
}

/// Bocha web search credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSettings {
    #[serde(default = "default_web_search_endpoint")]
    pub endpoint: String,

    pub api_key: String,

    /// Request timeout in seconds.
    #[serde(default = "default_web_search_timeout_secs")]
    pub timeout_secs: u64,
}

/// Local file store location.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    #[serde(default = "default_files_root")]
    pub root: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            root: default_files_root(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_user_id() -> i64 {
    1
}

fn default_worker_id() -> u16 {
    1
}

fn default_crawler_timeout_secs() -> u64 {
    30
}

fn default_web_search_endpoint() -> String {
    BOCHA_ENDPOINT.to_string()
}

fn default_web_search_timeout_secs() -> u64 {
    30
}

fn default_files_root() -> PathBuf {
    PathBuf::from("files")
}

impl ServerConfig {
    /// Loads configuration from `loomwork.toml` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("loomwork").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn default_user(&self) -> UserId {
        UserId::from_raw(self.default_user_id)
    }

    /// Model backends keyed by id.
    pub fn model_configs(&self) -> impl Iterator<Item = (ModelId, OpenAiConfig)> + '_ {
        self.models.iter().map(|m| (m.id, m.backend.clone()))
    }
}
