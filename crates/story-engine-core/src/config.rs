//! Engine-wide configuration consumed by the dispatch core.
//!
//! Mirrors the handful of `ASYNCY_*`/`ENGINE_*` environment variables the
//! original Python engine read directly off `os.environ` at startup.

use serde::{Deserialize, Serialize};

fn default_engine_port() -> u16 {
    8082
}

fn default_metrics_port() -> u16 {
    8085
}

fn default_synapse_port() -> u16 {
    9000
}

/// Host/port configuration the dispatch core needs to compose subscription
/// endpoints and to resolve the synthetic HTTP gateway hostname.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hostname this engine instance is reachable at, advertised as part of
    /// every subscription's `endpoint`.
    #[serde(default = "EngineConfig::default_engine_host")]
    pub engine_host: String,
    /// Port the inbound event endpoint listens on.
    #[serde(default = "default_engine_port")]
    pub engine_port: u16,
    /// Port metrics are exposed on (`METRICS_PORT`, the original's
    /// `--prometheus_port`).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Hostname of the in-process HTTP gateway (`ASYNCY_HTTP_GW_HOST`).
    #[serde(default = "EngineConfig::default_http_gateway_host")]
    pub http_gateway_host: String,
    /// Hostname of the subscription broker ("Synapse").
    #[serde(default = "EngineConfig::default_synapse_host")]
    pub synapse_host: String,
    /// Port of the subscription broker.
    #[serde(default = "default_synapse_port")]
    pub synapse_port: u16,
}

impl EngineConfig {
    fn default_engine_host() -> String {
        "localhost".to_string()
    }

    fn default_http_gateway_host() -> String {
        "gateway".to_string()
    }

    fn default_synapse_host() -> String {
        "synapse".to_string()
    }

    /// Load configuration from the environment, falling back to sensible
    /// local defaults for anything unset. Never fails: a development
    /// checkout without any `ASYNCY_*`/`ENGINE_*` variables set still gets a
    /// usable (if unroutable) configuration.
    pub fn from_env() -> Self {
        Self {
            engine_host: env_var_or("ENGINE_HOST", &Self::default_engine_host()),
            engine_port: env_var_parse_or("ENGINE_PORT", default_engine_port()),
            metrics_port: env_var_parse_or("METRICS_PORT", default_metrics_port()),
            http_gateway_host: env_var_or(
                "ASYNCY_HTTP_GW_HOST",
                &Self::default_http_gateway_host(),
            ),
            synapse_host: env_var_or("ASYNCY_SYNAPSE_HOST", &Self::default_synapse_host()),
            synapse_port: env_var_parse_or("ASYNCY_SYNAPSE_PORT", default_synapse_port()),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_host: Self::default_engine_host(),
            engine_port: default_engine_port(),
            metrics_port: default_metrics_port(),
            http_gateway_host: Self::default_http_gateway_host(),
            synapse_host: Self::default_synapse_host(),
            synapse_port: default_synapse_port(),
        }
    }
}

/// Read an environment variable, falling back to `default` if unset.
fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` if
/// unset or unparsable.
fn env_var_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_env() {
        let config = EngineConfig {
            engine_host: "localhost".into(),
            engine_port: 8082,
            metrics_port: 8085,
            http_gateway_host: "gateway".into(),
            synapse_host: "synapse".into(),
            synapse_port: 9000,
        };
        assert_eq!(config.engine_port, 8082);
        assert_eq!(config.metrics_port, 8085);
        assert_eq!(config.synapse_port, 9000);
    }

    #[test]
    fn default_trait_matches_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.http_gateway_host, "gateway");
        assert_eq!(config.synapse_host, "synapse");
        assert_eq!(config.metrics_port, 8085);
    }
}
