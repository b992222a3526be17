use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedserve::config::Config;
use feedserve::fetch::UrlFetcher;
use feedserve::parse::{ParseContext, ParserRegistry};
use feedserve::pubsub::{JsonSubscriptionStore, Subscriber};
use feedserve::server::{router, AppState};

#[derive(Parser)]
#[command(name = "feedserve")]
#[command(about = "Fetches podcast feeds and returns them as JSON")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "FEEDSERVE_BIND")]
    bind: Option<SocketAddr>,

    /// Directory for the subscription store
    #[arg(long, env = "FEEDSERVE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let bind = cli.bind.unwrap_or_else(Config::default_bind);
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_data_dir()?,
    };

    let fetcher = Arc::new(UrlFetcher::new());

    // hub subscriptions only work when the service knows its public URL
    let subscriber = match &config.base_url {
        Some(base_url) => {
            let store = Arc::new(JsonSubscriptionStore::open(&data_dir).await?);
            Some(Arc::new(Subscriber::new(
                store,
                Arc::clone(&fetcher),
                base_url,
            )))
        }
        None => {
            info!("BASE_URL not set, hub subscriptions disabled");
            None
        }
    };

    let state = AppState {
        registry: Arc::new(ParserRegistry::new()),
        ctx: Arc::new(ParseContext {
            fetcher,
            config,
            subscriber,
        }),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
