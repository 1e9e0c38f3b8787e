//! SignalZero backend — multi-agent pub/sub authenticity-scoring service.
//! Orchestrator drives the analysis lifecycle end-to-end; the HTTP/WS layer
//! is a thin façade in front of it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use signalzero_backend::api::{build_router, AppState};
use signalzero_backend::auth::{AuthState, JwtHandler};
use signalzero_backend::broker::{Broker, MemoryBroker, NatsBroker};
use signalzero_backend::config::AppConfig;
use signalzero_backend::intake::IntakeApi;
use signalzero_backend::middleware::{RateLimitConfig, RateLimitLayer};
use signalzero_backend::orchestrator::Orchestrator;
use signalzero_backend::push::PushBus;
use signalzero_backend::response_handler::ResponseHandler;
use signalzero_backend::shame_list::ShameList;
use signalzero_backend::store::Store;
use signalzero_backend::usage::UsageMeter;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!(bind_addr = %config.bind_addr, demo_mode = config.demo_mode, "starting signalzero");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let store = Store::open(&config.db_path, config.store_op_timeout)
        .context("failed to open data store")?;
    info!(db_path = %config.db_path, "data store initialized");

    let broker: Arc<dyn Broker> = match (&config.nats_url, config.demo_mode) {
        (Some(url), false) => {
            let nats = NatsBroker::connect(url, config.outbound_cap, config.reconnect_backoff, 10)
                .await
                .context("failed to connect to broker")?;
            info!(nats_url = %url, "connected to broker");
            Arc::new(nats)
        }
        _ => {
            info!("running with in-process memory broker (demo mode or no NATS_URL configured)");
            Arc::new(MemoryBroker::new())
        }
    };

    let usage = UsageMeter::new(store.clone(), config.usage_limits.clone());
    let push = PushBus::new(config.subscriber_cap);

    let orchestrator = Orchestrator::new(
        store.clone(),
        broker.clone(),
        usage,
        push.clone(),
        config.agent_timeout,
        config.demo_mode,
        config.demo_latency_min,
        config.demo_latency_max,
        config.health_grace,
    );

    let response_handler =
        ResponseHandler::new(store.clone(), orchestrator.clone(), config.handler_budget);
    let response_handler_broker = broker.clone();
    tokio::spawn(async move {
        response_handler.run(response_handler_broker).await;
    });

    let intake = IntakeApi::new(orchestrator.clone(), push.clone());
    let shame_list = ShameList::new(store.clone());

    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));
    let auth_state = AuthState::new(store.clone(), jwt_handler.clone());

    let state = AppState {
        store: store.clone(),
        intake,
        shame_list,
        push,
        broker: broker.clone(),
        admin_token: config.admin_token.clone(),
        metrics_handle,
    };

    let rate_limiter = RateLimitLayer::new(RateLimitConfig::default());
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let app = build_router(state, jwt_handler, auth_state, rate_limiter).layer(
        axum::middleware::from_fn(signalzero_backend::middleware::logging::request_logging),
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(orchestrator, config.drain_budget))
    .await
    .context("server error")?;

    Ok(())
}

async fn shutdown_signal(orchestrator: Arc<Orchestrator>, drain_budget: Duration) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("shutdown signal received, draining in-flight analyses");
    orchestrator.shutdown(drain_budget).await;
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalzero_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
