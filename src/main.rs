use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use claudine_auth::{PersistentTokenSource, RefreshTokenSource, StaticTokenSource, TokenSourceFactory};
use claudine_config::{AuthMethod, Config, LogFormat, StorageKind};
use claudine_proxy::{AppState, Upstream};
use claudine_store::{EnvStore, FileStore, KeyringStore};
use claudine_types::{TokenSource, TokenStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "claudine", about = "claudine, an Anthropic OAuth ambassador proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Start {
        /// Path to the TOML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Log level (debug|info|warn|error).
        #[arg(long)]
        log_level: Option<String>,
        /// Log format (text|json).
        #[arg(long)]
        log_format: Option<String>,
        /// Listen host.
        #[arg(long = "server--host")]
        server_host: Option<String>,
        /// Listen port.
        #[arg(long = "server--port")]
        server_port: Option<u16>,
        /// Upstream API base URL.
        #[arg(long = "upstream--base-url")]
        upstream_base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            log_level,
            log_format,
            server_host,
            server_port,
            upstream_base_url,
        } => {
            let mut cfg =
                claudine_config::load(config.as_deref()).context("failed to load config")?;

            // CLI flags take precedence over file and environment.
            if let Some(level) = log_level {
                cfg.log_level = level;
            }
            if let Some(format) = log_format {
                cfg.log_format = match format.as_str() {
                    "text" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    other => return Err(anyhow!("invalid log format: {other}")),
                };
            }
            if let Some(host) = server_host {
                cfg.server.host = host;
            }
            if let Some(port) = server_port {
                cfg.server.port = port;
            }
            if let Some(base_url) = upstream_base_url {
                cfg.upstream.base_url = base_url;
            }

            cfg.apply_defaults().context("failed to apply defaults")?;
            cfg.validate().context("invalid config")?;

            init_tracing(&cfg)?;
            serve(cfg).await
        }
    }
}

fn init_tracing(cfg: &Config) -> Result<()> {
    let level: tracing::Level = cfg
        .log_level
        .parse()
        .map_err(|_| anyhow!("invalid log level: {}", cfg.log_level))?;

    let builder = tracing_subscriber::fmt().with_max_level(level);
    match cfg.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// Build the token store from the auth configuration.
fn make_store(cfg: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match cfg.auth.storage {
        StorageKind::File => {
            let path = cfg
                .auth
                .file
                .as_ref()
                .ok_or_else(|| anyhow!("auth.file not set"))?;
            Arc::new(FileStore::new(path.clone()).context("failed to create file store")?)
        }
        StorageKind::Env => {
            let key = cfg
                .auth
                .env_key
                .as_ref()
                .ok_or_else(|| anyhow!("auth.env_key not set"))?;
            Arc::new(EnvStore::new(key.clone()).context("failed to create env store")?)
        }
        StorageKind::Keyring => {
            let user = cfg
                .auth
                .keyring_user
                .as_ref()
                .ok_or_else(|| anyhow!("auth.keyring_user not set"))?;
            Arc::new(KeyringStore::new(user.clone()).context("failed to create keyring store")?)
        }
    };
    Ok(store)
}

/// Build the process-wide token source. No I/O happens here; the stored
/// token is first read on the first proxied request.
fn make_token_source(cfg: &Config) -> Result<Arc<dyn TokenSource>> {
    let store = make_store(cfg)?;

    let factory: TokenSourceFactory = match cfg.auth.method {
        AuthMethod::OAuth => {
            Box::new(|stored| Arc::new(RefreshTokenSource::new(stored)) as Arc<dyn TokenSource>)
        }
        AuthMethod::Static => {
            Box::new(|stored| Arc::new(StaticTokenSource::new(stored)) as Arc<dyn TokenSource>)
        }
    };

    Ok(Arc::new(PersistentTokenSource::new(factory, store)))
}

async fn serve(cfg: Config) -> Result<()> {
    let tokens = make_token_source(&cfg)?;
    let state = AppState::new(Upstream::new(cfg.upstream.base_url.clone()), tokens);
    let app = claudine_proxy::make_router(state, &cfg.upstream_path());

    let address = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to listen on {address}"))?;
    tracing::info!(%address, "proxy listening");

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let trigger = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { trigger.notified().await })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    if cfg.shutdown.delay > 0 {
        tokio::time::sleep(Duration::from_secs(cfg.shutdown.delay)).await;
    }
    shutdown.notify_one();

    // Drain in-flight requests up to the timeout, then force-close.
    match tokio::time::timeout(Duration::from_secs(cfg.shutdown.timeout), &mut server).await {
        Ok(joined) => joined.context("server task failed")?.context("server error")?,
        Err(_) => {
            tracing::error!("graceful shutdown timed out, forcing exit");
            server.abort();
            return Err(anyhow!("shutdown timed out after {}s", cfg.shutdown.timeout));
        }
    }

    tracing::info!("stopped gracefully");
    Ok(())
}
