//! Agent/aggregator binary: loads [`config::AgentConfig`], wires the
//! configured stores to the configured protocol surfaces, and serves the
//! HTTP API until the process is asked to shut down.

mod config;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meta_core::model::ResType;
use meta_core::registry::ClusterRegistry;
use meta_core::store::ResourceStore;
use meta_net::fetch::client::{run_fetch_client, FetchClientConfig};
use meta_net::fetch::server::{handle_fetch, FetchBroadcast, FetchServerState};
use meta_net::push::acceptor::{handle_push, PushAcceptor};
use meta_net::push::exporter::new_push_exporter;
use meta_net::query::{query_handler, QueryEngine};

use config::AgentConfig;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = AgentConfig::load(&config_path)?;
    info!(cluster_id = %config.cluster_id, "starting agent");

    let registry = Arc::new(ClusterRegistry::new());
    let local_cluster = registry.get_or_create_cluster(&config.cluster_id);

    // Always track the well-known types eagerly; anything else shows up
    // on demand via the push acceptor / fetch client (spec.md §4.F).
    let local_stores: Vec<Arc<dyn ResourceStore>> = vec![
        local_cluster.get_or_create(ResType::POD),
        local_cluster.get_or_create(ResType::SERVICE),
        local_cluster.get_or_create(ResType::NODE),
    ];

    let fetch_broadcast = FetchBroadcast::new();
    for store in &local_stores {
        let _ = store.register_exporter(fetch_broadcast.clone());
    }

    let mut router = Router::new();

    if let Some(exporter_config) = &config.exporter {
        if exporter_config.enabled {
            let (handle, worker) = new_push_exporter(exporter_config.to_push_config(), local_stores.clone());
            for store in &local_stores {
                let _ = store.register_exporter(handle.clone());
            }
            tokio::spawn(worker.run());
            info!(acceptor_url = %exporter_config.acceptor_url, "push exporter started");
        }
    }

    if config.accept_event_source.enabled {
        let acceptor = PushAcceptor::with_default_exporters(registry.clone(), vec![fetch_broadcast.clone()]);
        let push_router = Router::new().route("/push", post(handle_push)).with_state(acceptor);
        router = router.merge(push_router);
        info!("push acceptor enabled on /push");
    }

    if config.querier.enabled {
        let query_engine = Arc::new(QueryEngine::new(registry.clone()));
        let query_router = Router::new().route("/query", post(query_handler)).with_state(query_engine);
        router = router.merge(query_router);
        info!("querier enabled on /query");
    }

    let fetch_state = Arc::new(FetchServerState {
        registry: registry.clone(),
        broadcast: fetch_broadcast.clone(),
    });
    let fetch_router = Router::new().route("/fetch", get(handle_fetch)).with_state(fetch_state);
    router = router.merge(fetch_router);

    for entry in &config.fetch_source.servers {
        let fetch_config = FetchClientConfig {
            server_url: entry.server_url.clone(),
            resource_types: entry.resource_types.iter().map(|t| ResType(*t)).collect(),
        };
        let registry = registry.clone();
        tokio::spawn(run_fetch_client(fetch_config, registry));
        info!(server = %entry.server_url, "fetch client started");
    }

    let listener = tokio::net::TcpListener::bind(&config.http_server.bind_addr).await?;
    info!(addr = %config.http_server.bind_addr, "listening");
    if let Err(error) = axum::serve(listener, router).await {
        warn!(%error, "http server exited");
    }

    Ok(())
}
