use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
  Local,
  S3,
  Memory,
}

#[derive(Deserialize, Debug)]
pub struct Config {
  pub app: AppConfig,
  pub storage: StorageConfig,
}

#[derive(Deserialize, Debug)]
pub struct AppConfig {
  pub listen: String,
  pub metrics_listen: String,
  #[serde(default = "default_max_body_size_mb")]
  pub max_body_size_mb: usize,
  pub enable_openapi: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct StorageConfig {
  pub storage_type: StorageType,
  pub s3: Option<StorageConfigS3>,
  pub local: Option<StorageConfigLocal>,
}

#[derive(Deserialize, Debug)]
pub struct StorageConfigS3 {
  pub endpoint: String,
  pub bucket: String,
  pub access_key_id: String,
  pub secret_access_key: String,
  pub region: String,
  pub force_path_style: bool,
  pub prefix: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct StorageConfigLocal {
  pub path: String,
}

fn default_max_body_size_mb() -> usize {
  10
}

pub fn parse(config_path: &str) -> Result<Config> {
  let toml_str = fs::read_to_string(config_path)
    .with_context(|| format!("failed to read config file: {}", config_path))?;

  from_str(&toml_str)
}

pub fn from_str(toml_str: &str) -> Result<Config> {
  toml::from_str(toml_str).context("failed to deserialize config")
}
