//! clinic-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, seeds the first admin account if needed, and serves the JSON API
//! over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `bootstrap_admin.password_hash`:
//!
//! ```text
//! cargo run -p clinic-server -- --hash-password
//! ```

mod settings;

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use clinic_api::{AppState, analysis::AnalysisClient};
use clinic_core::{
  audit::Actor,
  store::ClinicStore,
  user::{NewUser, Role},
};
use clinic_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{BootstrapAdmin, ServerConfig};

#[derive(Parser)]
#[command(author, version, about = "Clinic patient-record server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = ServerConfig::load(&cli.config)?;
  let store_path = expand_tilde(&server_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(admin) = &server_cfg.bootstrap_admin {
    bootstrap(&store, admin).await?;
  }

  if server_cfg.analysis.api_key.is_none() {
    tracing::warn!("no analysis api_key configured; /detect will fail");
  }
  let analyzer = AnalysisClient::new(server_cfg.analysis.clone())
    .context("failed to build analysis client")?;

  let state = AppState::new(Arc::new(store), server_cfg.api.clone(), analyzer);
  let app = clinic_api::router(state).layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await
  .context("server error")?;

  Ok(())
}

/// Create the configured admin when no account exists yet.
async fn bootstrap(store: &SqliteStore, admin: &BootstrapAdmin) -> anyhow::Result<()> {
  if !store.list_users().await?.is_empty() {
    return Ok(());
  }
  let user = store
    .add_user(Actor::system(), NewUser {
      username:      admin.username.clone(),
      password_hash: admin.password_hash.clone(),
      role:          Role::Admin,
      department:    Some("Administration".to_owned()),
    })
    .await
    .context("failed to create bootstrap admin")?;
  tracing::info!(username = %user.username, "created bootstrap admin");
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
