use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub admin_password: String,
    pub session_secret: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: u32,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub embedding_max_retries: usize,
    #[serde(default = "default_embedding_retry_base_ms")]
    pub embedding_retry_base_ms: u64,
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    #[serde(default = "default_entity_chunk_cap")]
    pub entity_chunk_cap: usize,
    #[serde(default = "default_community_report_cap")]
    pub community_report_cap: usize,
    #[serde(default = "default_ckan_base_url")]
    pub ckan_base_url: String,
    #[serde(default)]
    pub production: bool,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> u32 {
    768
}

fn default_embedding_batch_size() -> usize {
    50
}

fn default_embedding_max_retries() -> usize {
    3
}

fn default_embedding_retry_base_ms() -> u64 {
    300
}

fn default_embedding_concurrency() -> usize {
    1
}

fn default_entity_chunk_cap() -> usize {
    50
}

fn default_community_report_cap() -> usize {
    30
}

fn default_ckan_base_url() -> String {
    "https://dadosabertos.web.stj.jus.br".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

impl AppConfig {
    /// Validate production-only requirements. Missing or weak values abort
    /// startup so a misconfigured deployment never serves traffic.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.production {
            return Ok(());
        }
        if self.session_secret.len() < 32 {
            return Err(AppError::Config(
                "SESSION_SECRET must be at least 32 characters in production".into(),
            ));
        }
        if self.admin_password.is_empty() {
            return Err(AppError::Config(
                "ADMIN_PASSWORD must be set in production".into(),
            ));
        }
        if self.openai_api_key.is_empty() {
            return Err(AppError::Config(
                "OPENAI_API_KEY must be set in production".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            admin_password: "admin".into(),
            session_secret: "0123456789abcdef0123456789abcdef".into(),
            data_dir: "./data".into(),
            http_port: 0,
            openai_base_url: "http://127.0.0.1:1".into(),
            storage: StorageKind::Memory,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: 3,
            embedding_batch_size: default_embedding_batch_size(),
            embedding_max_retries: default_embedding_max_retries(),
            embedding_retry_base_ms: 1,
            embedding_concurrency: default_embedding_concurrency(),
            entity_chunk_cap: default_entity_chunk_cap(),
            community_report_cap: default_community_report_cap(),
            ckan_base_url: default_ckan_base_url(),
            production: false,
        }
    }
}
