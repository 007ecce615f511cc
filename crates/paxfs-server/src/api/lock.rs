// Lock API endpoints

use actix_web::{Responder, Scope, get, post, web};
use paxfs_consistency::{LockHolder, NamespaceService};
use tracing::info;

use super::error::error_response;
use super::model::{AcquireParam, AcquireResponse, ReleaseResponse, VersionedParam};
use crate::model::{self, AppState};

#[post("acquire")]
async fn acquire(data: web::Data<AppState>, params: web::Json<AcquireParam>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader
        .test_and_set_lock_owner(&params.path, params.instance, &params.client_id)
        .await
    {
        Ok(acquired) => {
            info!(path = %params.path, client_id = %params.client_id, acquired, "Lock acquire");
            model::Result::<AcquireResponse>::http_success(AcquireResponse { acquired })
        }
        Err(e) => error_response(&e),
    }
}

#[post("release")]
async fn release(data: web::Data<AppState>, params: web::Json<VersionedParam>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader.reset_lock_owner(&params.path, params.instance).await {
        Ok(released) => model::Result::<ReleaseResponse>::http_success(ReleaseResponse { released }),
        Err(e) => error_response(&e),
    }
}

/// Held locks as seen by the designated leader, or by replica 0 when none is designated
#[get("states")]
async fn states(data: web::Data<AppState>) -> impl Responder {
    let coordinator = match data.group.leader() {
        Some(leader) => leader,
        None => match data.group.nodes().first() {
            Some(node) => node.coordinator(),
            None => return model::Result::<Vec<LockHolder>>::http_success(Vec::<LockHolder>::new()),
        },
    };

    match coordinator.get_states().await {
        Ok(holders) => model::Result::<Vec<LockHolder>>::http_success(holders),
        Err(e) => error_response(&e),
    }
}

pub fn routes() -> Scope {
    web::scope("/lock")
        .service(acquire)
        .service(release)
        .service(states)
}
