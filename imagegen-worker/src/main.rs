use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use imagegen_worker::app_context::AppContext;
use imagegen_worker::config::Config;
use imagegen_worker::metrics::setup_metrics_routes;
use imagegen_worker::router;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;
    let context = AppContext::new(&config).await?;

    let app = router::router(
        context.pipeline,
        context.notifier,
        config.max_body_size,
        config.max_concurrent_invocations,
    );

    // Don't install metrics unless asked to
    let app = if config.export_prometheus {
        setup_metrics_routes(app)?
    } else {
        app
    };

    let bind = config.bind();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    Ok(())
}
