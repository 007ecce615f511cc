//! HTTP server setup and replica group construction

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};
use paxfs_common::PaxfsResult;
use paxfs_consistency::ReplicaGroup;
use tracing::info;

use crate::{
    api,
    middleware::metrics::RequestMetrics,
    model::{AppState, Configuration, StorageMode},
};

/// Build the replica group described by the configuration, without starting it
pub fn build_group(configuration: &Configuration) -> PaxfsResult<Arc<ReplicaGroup>> {
    let paxos = configuration.paxos_config();
    let mode = configuration.storage_mode()?;
    info!(
        replicas = paxos.replica_count,
        storage = %mode,
        data_dir = %paxos.data_dir.display(),
        "Building replica group"
    );

    let group = match mode {
        StorageMode::Memory => ReplicaGroup::in_memory(paxos)?,
        StorageMode::RocksDb => ReplicaGroup::persistent(paxos)?,
    };
    Ok(Arc::new(group))
}

/// Creates and binds the main HTTP server.
pub fn main_server(
    app_state: Arc<AppState>,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(RequestMetrics)
            .app_data(web::Data::from(app_state.clone()))
            .service(api::metrics::prometheus)
            .service(api::route::routes())
    })
    .bind((address, port))?
    .run())
}
