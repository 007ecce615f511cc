use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use paxfs_server::{
    metrics,
    model::{AppState, Configuration},
    startup,
};
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new()?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    };
    metrics::init_metrics();

    let group = startup::build_group(&configuration)?;
    group.start();

    let initial_leader = configuration.initial_leader();
    let role = group.elect(initial_leader).await?;
    info!(replica_id = initial_leader, role = %role, "Initial leader elected");

    let address = configuration.server_address();
    let port = configuration.server_port();
    let app_state = Arc::new(AppState::new(configuration, group.clone(), prometheus));

    info!("Starting paxfs server on {}:{}", address, port);
    startup::main_server(app_state, address, port)?.await?;

    group.shutdown().await;
    info!("paxfs server shutdown complete");

    Ok(())
}
