//! Fleet Node Operator
//!
//! Runs the NodeAllocationRequest and NodeReleaseRequest controllers against
//! the cluster the process is deployed in, along with the health and metrics
//! endpoints.

use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleet_node_operator::{
    ensure_kind_registered, run_controller, AllocationHandler, Context, ControllerMetrics, Engine,
    Error, FinalizerToken, KubeCredentialsStore, KubeStore, NodeAllocationRequest,
    NodeReleaseRequest, ReleaseHandler, Result, DEFAULT_FINALIZER,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Fleet Node Operator - hardware node allocation and release
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Finalizer token claiming managed requests; must be unique per
    /// controller sharing the cluster
    #[arg(long, env = "FINALIZER", default_value = DEFAULT_FINALIZER)]
    finalizer: String,

    /// BMC endpoint published for allocated nodes
    #[arg(long, env = "BMC_ADDRESS", default_value = "https://bmc.example.com")]
    bmc_address: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Fleet Node Operator");
    info!("  Version: {}", fleet_node_operator::VERSION);
    info!("  Finalizer: {}", args.finalizer);
    info!("  BMC address: {}", args.bmc_address);

    // Connect to the cluster
    let client = Client::try_default().await.map_err(|err| {
        Error::Configuration(format!("failed to build Kubernetes client: {err}"))
    })?;

    // Refuse to start against a cluster that does not serve our kinds
    ensure_kind_registered::<NodeAllocationRequest>(&client).await?;
    ensure_kind_registered::<NodeReleaseRequest>(&client).await?;

    let metrics = ControllerMetrics::new()?;
    let finalizer = FinalizerToken::new(args.finalizer.clone());

    // One engine per kind, sharing the finalizer token and the cluster client
    let allocation_engine = Engine::new(
        Arc::new(KubeStore::<NodeAllocationRequest>::new(client.clone())),
        Arc::new(AllocationHandler::new(
            Arc::new(KubeCredentialsStore::new(client.clone())),
            args.bmc_address.clone(),
        )),
        finalizer.clone(),
    );
    let release_engine = Engine::new(
        Arc::new(KubeStore::<NodeReleaseRequest>::new(client.clone())),
        Arc::new(ReleaseHandler),
        finalizer,
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    info!("Starting controllers");
    let allocation = run_controller(
        client.clone(),
        Arc::new(Context::new(allocation_engine, metrics.clone())),
    );
    let release = run_controller(client, Arc::new(Context::new(release_engine, metrics)));
    tokio::try_join!(allocation, release)?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    match encoder.encode(&metric_families, &mut buffer) {
                        Ok(()) => Response::builder()
                            .status(StatusCode::OK)
                            .header("Content-Type", encoder.format_type())
                            .body(Body::from(buffer))
                            .unwrap(),
                        Err(_) => Response::builder()
                            .status(StatusCode::INTERNAL_SERVER_ERROR)
                            .body(Body::from("encoding failed"))
                            .unwrap(),
                    }
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
