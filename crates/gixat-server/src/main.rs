//! Gixat Server
//!
//! GraphQL backend for garage management:
//! - Loads configuration from a YAML/TOML file and `GIXAT_*` env vars
//! - Opens the SQLite database and applies migrations
//! - Wires object storage (S3 or in-memory) and ClamAV scanning
//! - Serves `/graphql`, the media redirect route and health endpoints
//!
//! Usage:
//! ```bash
//! GIXAT_JWT_KEY=... gixat-server --config gixat.yaml
//! gixat-server migrate
//! gixat-server seed
//! ```

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{ServerConfig, StorageBackend};
use gixat_api::{ApiSettings, AppState, BackendReadiness, JwtSettings, Services, TokenService};
use gixat_core::store::LookupStore;
use gixat_core::{GarageStore, ObjectStore};
use gixat_media::{
    ClamAvScanner, Credentials, DisabledScanner, MemoryObjectStore, S3Config, S3ObjectStore,
    UploadPipeline, VirusScanner,
};
use gixat_observability::{HealthState, Metrics};
use gixat_store_sqlite::{SqliteGarageStore, current_version};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "gixat-server")]
#[command(about = "Gixat garage management GraphQL server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "GIXAT_CONFIG",
        global = true
    )]
    config: Option<String>,

    /// Address to bind
    #[arg(long, value_name = "HOST", global = true)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT", global = true)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Start the server (default if no command specified)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Apply migrations, insert lookup data and exit
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            ServerConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path))?
        }
        None => ServerConfig::default(),
    };

    // Env vars override the file, CLI flags override both
    config.merge_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config)?;

    if let Some(path) = cli.config.as_deref() {
        info!("📁 Loaded configuration from: {}", path);
    } else {
        info!("📁 Using default configuration");
    }

    let command = cli.command.unwrap_or(Commands::Serve);
    let database_url = expand_database_url(&config.database.url);

    match command {
        Commands::Migrate => {
            let store = open_store(&database_url, config.database.max_connections).await?;
            let version = current_version(store.pool()).await?;
            info!("✅ Database at schema version {}", version.unwrap_or(0));
            Ok(())
        }
        Commands::Seed => {
            let store = open_store(&database_url, config.database.max_connections).await?;
            let inserted = store.seed_lookups().await?;
            info!("🌱 Inserted {} lookup items", inserted);
            Ok(())
        }
        Commands::Serve => serve(config, &database_url).await,
    }
}

fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(log_level.to_string());

    // sqlx logs every statement at info; keep it quiet unless asked for
    if !config.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Failed to set sqlx log filter: {}", e),
        }
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Expand `~` in file-backed SQLite URLs
fn expand_database_url(url: &str) -> String {
    if let Some(path) = url.strip_prefix("sqlite://") {
        format!("sqlite://{}", shellexpand::tilde(path))
    } else {
        url.to_string()
    }
}

async fn open_store(url: &str, max_connections: u32) -> anyhow::Result<SqliteGarageStore> {
    let store = SqliteGarageStore::connect(url, max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", url))?;
    info!("🗄️  Database ready: {}", url);
    Ok(store)
}

fn build_object_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::S3 => {
            let storage = &config.storage;
            let store = S3ObjectStore::new(S3Config {
                bucket: storage.bucket.clone(),
                region: storage.region.clone(),
                endpoint: storage.endpoint.clone(),
                credentials: Credentials {
                    access_key_id: storage.access_key_id.clone(),
                    secret_access_key: storage.secret_access_key.clone(),
                },
                path_style: storage.path_style,
                timeout_secs: storage.timeout_secs,
            })?;
            info!(
                "✓ S3 storage: bucket {} in {}{}",
                storage.bucket,
                storage.region,
                storage
                    .endpoint
                    .as_deref()
                    .map(|e| format!(" via {}", e))
                    .unwrap_or_default()
            );
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("⚠️  In-memory object storage: uploads are lost on restart");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
    }
}

fn build_scanner(config: &ServerConfig) -> Arc<dyn VirusScanner> {
    let scan = &config.virus_scan;
    if scan.enabled {
        info!("🛡️  ClamAV scanning via {}:{}", scan.host, scan.port);
        Arc::new(ClamAvScanner::new(
            scan.host.clone(),
            scan.port,
            Duration::from_secs(scan.timeout_secs),
        ))
    } else {
        info!("🛡️  Virus scanning disabled");
        Arc::new(DisabledScanner)
    }
}

async fn serve(config: ServerConfig, database_url: &str) -> anyhow::Result<()> {
    config.validate()?;

    info!("🚀 Starting Gixat server v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(database_url, config.database.max_connections).await?;
    match store.seed_lookups().await {
        Ok(0) => {}
        Ok(inserted) => info!("🌱 Seeded {} lookup items", inserted),
        Err(e) => warn!("Failed to seed lookup items: {}", e),
    }
    let store: Arc<dyn GarageStore> = Arc::new(store);

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let objects = build_object_store(&config)?;
    let scanner = build_scanner(&config);
    let pipeline = UploadPipeline::new(objects.clone(), scanner).with_metrics(metrics.clone());

    let tokens = TokenService::new(JwtSettings {
        key: config.jwt.key.clone(),
        issuer: config.jwt.issuer.clone(),
        audience: config.jwt.audience.clone(),
        expire_days: config.jwt.expire_days,
    });

    let services = Services {
        store: store.clone(),
        pipeline,
        tokens,
        metrics: metrics.clone(),
        settings: ApiSettings {
            frontend_url: config.frontend_url.clone(),
            secure_cookies: config.secure_cookies,
        },
    };
    let state = AppState::new(&services);

    let health = HealthState::with_readiness_checker(
        metrics,
        Arc::new(BackendReadiness::new(store, objects)),
    );
    let app = gixat_api::router(state, health, &config.cors.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    info!("");
    info!("✅ Gixat listening on http://{}", addr);
    info!("   GraphQL:  http://{}/graphql", addr);
    info!("   Health:   http://{}/healthz", addr);
    info!("   Metrics:  http://{}/metrics", addr);
    info!("   CORS:     {}", config.cors.allowed_origins.join(", "));
    info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
