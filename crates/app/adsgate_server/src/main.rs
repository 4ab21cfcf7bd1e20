//! adsgate server binary.
//!
//! Loads configuration, proves the configured credentials can mint an access
//! token, and only then binds the listener.

use std::net::SocketAddr;

use adsgate_api::AppState;
use adsgate_core::config::GatewayConfig;
use clap::Parser;
use tracing::{error, info};

/// CLI arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "adsgate_server", about = "Google Ads API gateway")]
struct Args {
    /// Port to listen on. Overrides `PORT` from the environment file.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,adsgate_api=debug,adsgate_core=debug")
            }),
        )
        .init();

    run(Args::parse())
        .await
        .inspect_err(|e| error!(error = %e, "adsgate_server exited with an error"))
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = GatewayConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!(
        environment = %config.environment,
        strategy = config.auth.credentials.strategy(),
        api_version = %config.ads.api_version,
        "starting adsgate_server"
    );

    let bind_addr = format!("{}:{}", args.host, config.port);
    let state = AppState::new(config, reqwest_client()?);

    // Refuse to serve until the credentials have produced a token.
    state.tokens.get_access_token().await.map_err(|e| {
        error!(error = %e, "startup authentication failed");
        e
    })?;
    info!("startup authentication succeeded");

    state.rate_limiter.spawn_cleanup_task();

    let app = adsgate_api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("gateway stopped");
    Ok(())
}

fn reqwest_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("adsgate/", env!("CARGO_PKG_VERSION")))
        .build()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
