//! Agent configuration (spec.md ambient config section).
//!
//! Mirrors the shape of the original `MetaSourceConfig`: one top-level
//! TOML document with a section per optional surface the agent can run —
//! an agent pushing into an aggregator enables `[exporter]`, an aggregator
//! enables `[accept_event_source]` and `[querier]`, and either can also
//! enable `[fetch_source]` to mirror another aggregator's fetch feed.
//! Every section is optional; an agent only wires up the surfaces present
//! in its config file.

use std::time::Duration;

use serde::Deserialize;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        HttpServerConfig { bind_addr: default_bind_addr() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptEventSourceConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub enabled: bool,
    pub acceptor_url: String,
    #[serde(default = "default_tick_seconds")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_health_check_seconds")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_enqueue_timeout_seconds")]
    pub enqueue_timeout_seconds: u64,
}

fn default_tick_seconds() -> u64 {
    3
}

fn default_health_check_seconds() -> u64 {
    5
}

fn default_enqueue_timeout_seconds() -> u64 {
    10
}

impl ExporterConfig {
    pub fn to_push_config(&self) -> meta_net::push::exporter::PushExporterConfig {
        meta_net::push::exporter::PushExporterConfig {
            acceptor_url: self.acceptor_url.clone(),
            tick_interval: Duration::from_secs(self.tick_interval_seconds),
            health_check_interval: Duration::from_secs(self.health_check_interval_seconds),
            enqueue_timeout: Duration::from_secs(self.enqueue_timeout_seconds),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerierConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSourceEntry {
    pub server_url: String,
    #[serde(default)]
    pub resource_types: Vec<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchSourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub servers: Vec<FetchSourceEntry>,
}

/// Top-level agent configuration, loaded from a TOML file and then given a
/// chance to be overridden by environment variables (`CLUSTER_ID` today,
/// matching the original's container-orchestrator-injected override).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub cluster_id: String,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub accept_event_source: AcceptEventSourceConfig,
    pub exporter: Option<ExporterConfig>,
    #[serde(default)]
    pub querier: QuerierConfig,
    #[serde(default)]
    pub fetch_source: FetchSourceConfig,
}

impl Default for AcceptEventSourceConfig {
    fn default() -> Self {
        AcceptEventSourceConfig { enabled: false }
    }
}

impl Default for QuerierConfig {
    fn default() -> Self {
        QuerierConfig { enabled: false }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: AgentConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `CLUSTER_ID` set in the environment always wins over the file —
    /// the original reads this from the pod's downward API so the same
    /// config file can be shared across every agent in a deployment.
    fn apply_env_overrides(&mut self) {
        if let Ok(cluster_id) = std::env::var("CLUSTER_ID") {
            if !cluster_id.is_empty() {
                self.cluster_id = cluster_id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_sections_fall_back_to_disabled_defaults() {
        let toml_str = r#"
            cluster_id = "cluster-a"
        "#;
        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cluster_id, "cluster-a");
        assert!(!config.accept_event_source.enabled);
        assert!(!config.querier.enabled);
        assert!(config.exporter.is_none());
        assert_eq!(config.http_server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn env_override_replaces_cluster_id() {
        let toml_str = r#"
            cluster_id = "from-file"
        "#;
        let mut config: AgentConfig = toml::from_str(toml_str).unwrap();
        std::env::set_var("CLUSTER_ID", "from-env");
        config.apply_env_overrides();
        std::env::remove_var("CLUSTER_ID");
        assert_eq!(config.cluster_id, "from-env");
    }
}
