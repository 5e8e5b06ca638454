//! Quill configuration parsing.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlConfig {
    /// The port on which the GraphQL API server should listen.
    #[serde(default = "Config::default_graphql_api_port")]
    pub port: u16,
    /// Operations nesting object fields deeper than this are rejected before
    /// execution. A query of scalar fields only has depth 0.
    #[serde(default = "Config::default_max_query_depth")]
    pub max_query_depth: usize,
}

impl Default for GraphQlConfig {
    fn default() -> Self {
        Self {
            port: Config::default_graphql_api_port(),
            max_query_depth: Config::default_max_query_depth(),
        }
    }
}

/// A [`serde`]-compatible representation of Quill's YAML configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// GraphQL API configuration.
    #[serde(default)]
    pub graphql: GraphQlConfig,
    /// The URL of the PostgreSQL database to use.
    pub database_url: String,
    /// The port on which the Prometheus exporter should listen.
    #[serde(default = "Config::default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("can't open config file {}", path.display()))?;
        serde_yaml::from_reader(file).context("invalid config file")
    }

    fn default_prometheus_port() -> u16 {
        9184
    }

    fn default_graphql_api_port() -> u16 {
        3030
    }

    fn default_max_query_depth() -> usize {
        5
    }
}
