// Cluster management API endpoints
// Replica status, leadership transfer and acceptor availability

use actix_web::{Responder, Scope, get, put, web};
use tracing::info;

use super::error::error_response;
use super::model::{AcceptorQuery, ClusterStatus, LeaderQuery, LeaderResponse};
use crate::model::{self, AppState};

#[get("status")]
async fn status(data: web::Data<AppState>) -> impl Responder {
    let quorum = data.group.quorum();
    model::Result::<ClusterStatus>::http_success(ClusterStatus {
        leader: data.group.leader_id(),
        acceptors: quorum.size(),
        live_acceptors: quorum.live_acceptors(),
        replicas: data.group.statuses(),
    })
}

/// Transfer leadership to `replicaId`
#[put("leader")]
async fn transfer_leader(data: web::Data<AppState>, params: web::Query<LeaderQuery>) -> impl Responder {
    match data.group.elect(params.replica_id).await {
        Ok(role) => {
            info!(replica_id = params.replica_id, role = %role, "Leadership transferred");
            model::Result::<LeaderResponse>::http_success(LeaderResponse {
                replica_id: params.replica_id,
                role: role.as_str().to_string(),
            })
        }
        Err(e) => error_response(&e),
    }
}

/// Mark the acceptor of `replicaId` up or down
#[put("acceptor")]
async fn set_acceptor(data: web::Data<AppState>, params: web::Query<AcceptorQuery>) -> impl Responder {
    match data.group.set_acceptor_up(params.replica_id, params.up) {
        Ok(()) => model::Result::<bool>::http_success(true),
        Err(e) => error_response(&e),
    }
}

pub fn routes() -> Scope {
    web::scope("/cluster")
        .service(status)
        .service(transfer_leader)
        .service(set_acceptor)
}
