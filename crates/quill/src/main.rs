use std::net::Ipv4Addr;

use clap::Parser;
use prometheus_exporter::prometheus;
use quill_lib::config::Config;
use quill_lib::graphql_api::{self, ApiSchemaContext};
use quill_lib::{CliOptions, DepthGuard, PrometheusExporter, QUILL_VERSION};
use quill_store::Store;
use tokio::net::TcpListener;
use tracing::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = QUILL_VERSION, "Starting Quill");

    info!("Parse options");
    let cli_options = CliOptions::parse();

    info!("Loading configuration file");
    let config = Config::read(&cli_options.config)?;

    info!("Initialize store and running migrations");
    let store = Store::new(&config.database_url).await?;
    info!("Store initialization successful");

    let registry = prometheus::default_registry().clone();
    let _exporter = PrometheusExporter::start(config.prometheus_port, registry)?;
    // Registers the metrics up front, so they're exported before the first
    // request comes in.
    quill_lib::metrics();

    let guard = DepthGuard::new(config.graphql.max_query_depth);
    let schema = graphql_api::api_schema(ApiSchemaContext::new(store));
    let router = graphql_api::api_router(schema, guard);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.graphql.port)).await?;
    info!(
        port = config.graphql.port,
        max_query_depth = guard.limit(),
        "Serving the GraphQL API"
    );
    // Listen to requests forever.
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
