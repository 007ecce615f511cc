// Namespace API endpoints
// Create, open, delete, read and update nodes on the current leader

use actix_web::{Responder, Scope, get, post, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use paxfs_consistency::NamespaceService;
use tracing::{debug, info};

use super::error::{bad_request, error_response};
use super::model::{
    CreateParam, InstanceResponse, PathQuery, ReadResponse, UpdateParam, VersionedParam,
};
use crate::model::{self, AppState};

#[post("create")]
async fn create(data: web::Data<AppState>, params: web::Json<CreateParam>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader.check_and_create(&params.path, params.is_dir).await {
        Ok(instance) => {
            info!(path = %params.path, is_dir = params.is_dir, instance, "Node created");
            model::Result::<InstanceResponse>::http_success(InstanceResponse { instance })
        }
        Err(e) => error_response(&e),
    }
}

#[get("open")]
async fn open(data: web::Data<AppState>, params: web::Query<PathQuery>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader.check_and_open(&params.path).await {
        Ok(instance) => model::Result::<InstanceResponse>::http_success(InstanceResponse { instance }),
        Err(e) => error_response(&e),
    }
}

#[post("delete")]
async fn delete(data: web::Data<AppState>, params: web::Json<VersionedParam>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader.check_and_delete(&params.path, params.instance).await {
        Ok(()) => {
            info!(path = %params.path, instance = params.instance, "Node deleted");
            model::Result::<bool>::http_success(true)
        }
        Err(e) => error_response(&e),
    }
}

#[post("read")]
async fn read(data: web::Data<AppState>, params: web::Json<VersionedParam>) -> impl Responder {
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader.check_and_read(&params.path, params.instance).await {
        Ok((content, meta)) => model::Result::<ReadResponse>::http_success(ReadResponse {
            content: STANDARD.encode(content),
            meta,
        }),
        Err(e) => error_response(&e),
    }
}

#[post("update")]
async fn update(data: web::Data<AppState>, params: web::Json<UpdateParam>) -> impl Responder {
    let content = match STANDARD.decode(params.content.as_bytes()) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %params.path, error = %e, "Rejected undecodable content");
            return bad_request(format!("content is not valid base64: {}", e));
        }
    };
    let leader = match data.leader() {
        Ok(leader) => leader,
        Err(e) => return error_response(&e),
    };

    match leader
        .check_and_update(&params.path, params.instance, content)
        .await
    {
        Ok(instance) => {
            info!(path = %params.path, instance, "Node updated");
            model::Result::<InstanceResponse>::http_success(InstanceResponse { instance })
        }
        Err(e) => error_response(&e),
    }
}

pub fn routes() -> Scope {
    web::scope("/ns")
        .service(create)
        .service(open)
        .service(delete)
        .service(read)
        .service(update)
}
