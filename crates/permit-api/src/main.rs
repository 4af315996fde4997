//! permit-api server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store and serves the JSON API over HTTP. The `seed` and
//! `create-admin` subcommands prepare a fresh database.
//!
//! ```
//! cargo run -p permit-api --bin server -- seed --sample
//! cargo run -p permit-api --bin server -- create-admin --email admin@example.com
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use permit_api::{
  AppState, ServerConfig,
  analysis::AnalysisQueue,
  auth::{JwtKeys, hash_password},
  openai::OpenAiAnalyzer,
  seed,
};
use permit_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Permit application intake server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Upsert the reference councils and permit types.
  Seed {
    /// Also create a demo citizen with one submitted application.
    #[arg(long)]
    sample: bool,
  },
  /// Create an admin account, or promote an existing one. Reads the
  /// password from stdin (echoed).
  CreateAdmin {
    #[arg(long)]
    email:      String,
    #[arg(long, default_value = "System")]
    first_name: String,
    #[arg(long, default_value = "Administrator")]
    last_name:  String,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PERMIT").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, server_cfg).await,
    Command::Seed { sample } => {
      let summary = seed::seed_reference_data(&store, sample)
        .await
        .context("seeding failed")?;
      println!(
        "Seeded {} with {} permit types",
        summary.council.name,
        summary.permit_types.len()
      );
      if let Some((user, application)) = summary.sample {
        println!("Sample application {} for {}", application.reference, user.email);
      }
      store.close().await.context("failed to close store")
    }
    Command::CreateAdmin { email, first_name, last_name } => {
      let password = read_password_line()?;
      anyhow::ensure!(!password.is_empty(), "password must not be empty");
      let hash = hash_password(password).await.context("failed to hash password")?;
      let admin = seed::ensure_admin(&store, &email, &first_name, &last_name, hash)
        .await
        .context("failed to create admin")?;
      println!("Admin {} ({})", admin.email, admin.id);
      store.close().await.context("failed to close store")
    }
  }
}

async fn serve(store: SqliteStore, server_cfg: ServerConfig) -> anyhow::Result<()> {
  anyhow::ensure!(
    !server_cfg.jwt_secret.is_empty(),
    "jwt_secret must be set (config file or PERMIT__JWT_SECRET)"
  );

  let store = Arc::new(store);

  // Start the analysis worker when an API key is configured.
  let (analysis, worker) = match server_cfg.analysis.api_key.as_deref() {
    Some(key) if !key.is_empty() => {
      let analyzer = OpenAiAnalyzer::new(&server_cfg.analysis, key)
        .context("failed to build analysis client")?;
      let (queue, worker) = AnalysisQueue::start(
        store.clone(),
        analyzer,
        server_cfg.analysis.queue_capacity,
      );
      tracing::info!(model = %server_cfg.analysis.model, "analysis enabled");
      (queue, Some(worker))
    }
    _ => {
      tracing::warn!("no analysis api_key configured; submissions will not be analysed");
      (AnalysisQueue::disabled(), None)
    }
  };

  // Build application state.
  let state = AppState {
    store:    store.clone(),
    jwt:      Arc::new(JwtKeys::new(
      &server_cfg.jwt_secret,
      TimeDelta::hours(server_cfg.jwt_ttl_hours),
    )),
    config:   Arc::new(server_cfg.clone()),
    analysis,
  };

  let app = permit_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // The router (and with it every queue sender) is gone; let the worker drain.
  if let Some(worker) = worker
    && let Err(e) = worker.await
  {
    tracing::error!(error = %e, "analysis worker panicked");
  }

  match Arc::try_unwrap(store) {
    Ok(store) => store.close().await.context("failed to close store")?,
    Err(_) => tracing::warn!("store still shared at shutdown; not closing explicitly"),
  }
  tracing::info!("shut down");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
}

/// Read one line from stdin as the password. It is echoed, so pipe it in
/// rather than typing it where others can see.
fn read_password_line() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
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
