mod cli;
pub mod config;
pub mod depth_guard;
pub mod graphql_api;
mod prometheus_metrics;

pub use cli::CliOptions;
pub use depth_guard::{DepthGuard, Verdict};
pub use prometheus_metrics::{metrics, PrometheusExporter, PrometheusMetrics};

pub const QUILL_VERSION: &str = env!("CARGO_PKG_VERSION");
