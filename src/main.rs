use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roster_gateway::app;
use roster_gateway::clock::SystemClock;
use roster_gateway::config::Args;
use roster_gateway::error::AppError;
use roster_gateway::load_balancer::{LoadBalancer, health_checker};
use roster_gateway::metrics::TRACKED_WINDOWS;
use roster_gateway::rate_limit::RateLimiter;
use roster_gateway::state::AppState;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Err(e) = run(args).await {
        error!(error = %e, "Gateway stopped");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roster_gateway=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let quota = args.quota()?;
    let load_balancer = Arc::new(LoadBalancer::new(&args.backends)?);
    let rate_limiter = Arc::new(
        RateLimiter::new(Arc::new(SystemClock))
            .with_sweep_interval(Duration::from_millis(args.sweep_interval_ms))
            .with_tracked_gauge(TRACKED_WINDOWS.clone()),
    );

    // background tasks: backend health and, optionally, window reaping
    tokio::spawn(health_checker(
        Arc::clone(&load_balancer),
        reqwest::Client::new(),
        Duration::from_secs(args.health_interval.max(1)),
        args.health_path.clone(),
    ));
    if args.reaper_interval_ms > 0 {
        rate_limiter.spawn_reaper(Duration::from_millis(args.reaper_interval_ms));
    }

    let state = Arc::new(AppState {
        client: reqwest::Client::new(),
        load_balancer,
        rate_limiter,
        quota,
        trust_proxy: args.trust_proxy,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "Gateway listening");
    info!(
        max_requests = quota.max_requests(),
        window_ms = quota.window_ms(),
        sweep_interval_ms = args.sweep_interval_ms,
        "Rate limit configured"
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
