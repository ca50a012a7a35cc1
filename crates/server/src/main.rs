use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use faultline_server::{ServerConfig, app, build_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error, aborting");
            std::process::exit(1);
        }
    };

    let (state, tasks) = match app::build_app(&config).await {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "bootstrap failed, aborting");
            std::process::exit(1);
        }
    };
    let engine = state.engine.clone();

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "cannot bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_addr, "faultline server listening");

    let router = build_router(state);
    let serve = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });

    if let Err(e) = serve.await {
        error!(error = %e, "server error");
    }

    tasks.stop();
    engine.stop();
    info!("faultline server stopped");
}
