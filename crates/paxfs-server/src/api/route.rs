use actix_web::{Scope, web};

use super::{cluster, lock, namespace};

pub fn routes() -> Scope {
    web::scope("/v1")
        .service(namespace::routes())
        .service(lock::routes())
        .service(cluster::routes())
}
