//! ofsociald: the ofsocial daemon.
//!
//! Assembles the server from its parts:
//! - State store (redb)
//! - Resource manager (one completion backend per accelerator)
//! - Content sanitizer + generation policy
//! - Dispatcher (persona comment fan-out)
//! - HTTP API + static pages
//!
//! # Usage
//!
//! ```text
//! ofsociald serve --config ofsocial.toml --port 5000
//! ofsociald default-config > ofsocial.toml
//! ofsociald hash-password 'correct horse'
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ofsocial_api::{ApiState, build_router};
use ofsocial_content::{ContentSanitizer, GenerationPolicy};
use ofsocial_core::OfsConfig;
use ofsocial_core::config::{ResourceConfig, password_digest};
use ofsocial_dispatcher::Dispatcher;
use ofsocial_runtime::ResourceManager;
use ofsocial_state::StateStore;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "ofsocial.toml";

const DEFAULT_LOG_FILTER: &str = "info,ofsociald=debug,ofsocial=debug";

#[derive(Parser)]
#[command(name = "ofsociald", about = "ofsocial daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server.
    Serve(ServeArgs),

    /// Print the default configuration as TOML.
    DefaultConfig,

    /// Print the SHA-256 digest to use as `admin.password_sha256`.
    HashPassword { password: String },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Configuration file (defaults to ./ofsocial.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for the database.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding index.html, admin.html and static assets.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Completion endpoint, one per accelerator. Repeat to add resources;
    /// replaces the configured resource list.
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::DefaultConfig => {
            print!("{}", OfsConfig::default().to_toml_string()?);
            Ok(())
        }
        Command::HashPassword { password } => {
            println!("{}", password_digest(&password));
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<OfsConfig> {
    match path {
        Some(path) => OfsConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            OfsConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(OfsConfig::default()),
    }
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut OfsConfig, args: &ServeArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config.server.data_dir = data_dir.clone();
    }
    if let Some(static_dir) = &args.static_dir {
        config.server.static_dir = static_dir.clone();
    }
    if !args.endpoints.is_empty() {
        config.model.resources = args
            .endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| ResourceConfig {
                device: format!("cuda:{i}"),
                endpoint: endpoint.clone(),
            })
            .collect();
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!("ofsocial daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    if store.seed_default_personas()? {
        info!("default personas seeded");
    }

    let resources = Arc::new(ResourceManager::from_config(&config.model)?);
    let policy = Arc::new(GenerationPolicy::new(
        resources.clone(),
        ContentSanitizer::new()?,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        policy,
        &config.dispatcher,
    ));
    info!(
        resources = resources.resource_count(),
        workers = dispatcher.worker_count(),
        personas = store.list_personas()?.len(),
        "generation pipeline ready"
    );

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        store,
        dispatcher: dispatcher.clone(),
        admin: Arc::new(config.admin.clone()),
        static_dir: Arc::new(config.server.static_dir.clone()),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    // Let in-flight comment generation finish before exiting.
    dispatcher.shutdown(true).await;

    info!("ofsocial daemon stopped");
    Ok(())
}
