//! Server configuration, read from a TOML file and `CLINIC_*` environment
//! variables.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `CLINIC_ANALYSIS__API_KEY` sets `analysis.api_key`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clinic_api::{ApiSettings, analysis::AnalysisSettings};
use serde::Deserialize;

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub store_path:      PathBuf,
  /// Seeded as an admin account when the store has no users yet.
  pub bootstrap_admin: Option<BootstrapAdmin>,
  pub api:             ApiSettings,
  pub analysis:        AnalysisSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
  pub username:      String,
  /// argon2 PHC string, as printed by `--hash-password`.
  pub password_hash: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:            "127.0.0.1".to_owned(),
      port:            8080,
      store_path:      PathBuf::from("clinic.db"),
      bootstrap_admin: None,
      api:             ApiSettings::default(),
      analysis:        AnalysisSettings::default(),
    }
  }
}

impl ServerConfig {
  /// Layer the file at `path` (optional) under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder()
        .add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .add_source(
        config::Environment::with_prefix("CLINIC")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}
