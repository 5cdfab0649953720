mod clock;
mod config;
mod error;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod redis_store;
mod state;
mod store;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::config::Args;
use crate::rate_limit::RequestAdmissionGuard;
use crate::state::AppState;
use crate::store::{StoreBackend, build_store, expiry_sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();
    url::Url::parse(&args.cal_url)?;

    let window = Duration::from_secs(args.rate_window);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&args);

    // in-memory entries only expire when swept
    if let Some(StoreBackend::Memory(memory)) = &store {
        tokio::spawn(expiry_sweeper(
            Arc::clone(memory),
            Arc::clone(&clock),
            window,
            Duration::from_secs(args.purge_interval),
        ));
    }

    let guard = RequestAdmissionGuard::new(store, args.rate_limit, window)
        .with_timeout(Duration::from_millis(args.store_timeout_ms))
        .with_prefix(args.key_prefix.clone())
        .with_clock(clock);

    let state = Arc::new(AppState {
        guard,
        cal_url: args.cal_url.clone(),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!(
        "Rate limit: {} requests per {} seconds ({:?} store)",
        args.rate_limit, args.rate_window, args.store
    );
    axum::serve(listener, app).await?;
    Ok(())
}
