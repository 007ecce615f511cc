// HTTP API tests against an in-memory replica group

use std::sync::Arc;

use actix_web::{App, http::StatusCode, test, web};
use paxfs_common::error::{NO_QUORUM, NOT_LEADER, PARAMETER_VALIDATE_ERROR, VERSION_CONFLICT};
use paxfs_consistency::{PaxosConfig, ReplicaGroup};
use paxfs_server::api;
use paxfs_server::model::{AppState, Configuration};
use serde_json::{Value, json};

async fn group(elect: bool) -> Arc<ReplicaGroup> {
    let config = PaxosConfig::new(3, 0, std::env::temp_dir().join("paxfs-api-tests"));
    let group = Arc::new(ReplicaGroup::in_memory(config).unwrap());
    group.start();
    if elect {
        group.elect(0).await.unwrap();
    }
    group
}

fn state(group: Arc<ReplicaGroup>) -> Arc<AppState> {
    Arc::new(AppState::new(Configuration::default(), group, None))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($state))
                .service(api::metrics::prometheus)
                .service(api::route::routes()),
        )
        .await
    };
}

macro_rules! post {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri($uri)
            .set_json($body)
            .to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn test_namespace_round_trip() {
    let group = group(true).await;
    let app = app!(state(group.clone()));

    let (status, body) = post!(app, "/v1/ns/create", json!({"path": "/a", "isDir": true}));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["instance"], 1);

    let (_, body) = post!(app, "/v1/ns/create", json!({"path": "/a/f"}));
    assert_eq!(body["data"]["instance"], 2);

    let req = test::TestRequest::get()
        .uri("/v1/ns/open?path=/a/f")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["instance"], 2);

    let (status, body) = post!(
        app,
        "/v1/ns/update",
        json!({"path": "/a/f", "instance": 2, "content": "aGVsbG8="})
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["instance"], 3);

    let (_, body) = post!(app, "/v1/ns/read", json!({"path": "/a/f", "instance": 3}));
    assert_eq!(body["data"]["content"], "aGVsbG8=");
    assert_eq!(body["data"]["meta"]["instanceNumber"], 3);
    assert_eq!(body["data"]["meta"]["contentLength"], 5);

    let (status, _) = post!(app, "/v1/ns/delete", json!({"path": "/a/f", "instance": 3}));
    assert_eq!(status, StatusCode::OK);

    group.shutdown().await;
}

#[actix_web::test]
async fn test_stale_update_is_conflict() {
    let group = group(true).await;
    let app = app!(state(group.clone()));

    post!(app, "/v1/ns/create", json!({"path": "/f"}));
    post!(
        app,
        "/v1/ns/update",
        json!({"path": "/f", "instance": 1, "content": ""})
    );

    let (status, body) = post!(
        app,
        "/v1/ns/update",
        json!({"path": "/f", "instance": 1, "content": "eA=="})
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], VERSION_CONFLICT.code);
    assert!(body["data"].is_null());

    group.shutdown().await;
}

#[actix_web::test]
async fn test_rejects_bad_input() {
    let group = group(true).await;
    let app = app!(state(group.clone()));

    let (status, body) = post!(
        app,
        "/v1/ns/update",
        json!({"path": "/f", "instance": 1, "content": "not base64!"})
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], PARAMETER_VALIDATE_ERROR.code);

    let (status, _) = post!(app, "/v1/ns/create", json!({"path": "relative"}));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post!(app, "/v1/ns/create", json!({"path": "/x/y"}));
    assert_eq!(status, StatusCode::NOT_FOUND);

    group.shutdown().await;
}

#[actix_web::test]
async fn test_lock_acquire_release_states() {
    let group = group(true).await;
    let app = app!(state(group.clone()));

    post!(app, "/v1/ns/create", json!({"path": "/l"}));

    let (_, body) = post!(
        app,
        "/v1/lock/acquire",
        json!({"path": "/l", "instance": 1, "clientId": "client-A"})
    );
    assert_eq!(body["data"]["acquired"], true);

    let (_, body) = post!(
        app,
        "/v1/lock/acquire",
        json!({"path": "/l", "instance": 1, "clientId": "client-B"})
    );
    assert_eq!(body["data"]["acquired"], false);

    let req = test::TestRequest::get().uri("/v1/lock/states").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body["data"],
        json!([{"clientId": "client-A", "path": "/l"}])
    );

    let (_, body) = post!(app, "/v1/lock/release", json!({"path": "/l", "instance": 1}));
    assert_eq!(body["data"]["released"], true);

    let req = test::TestRequest::get().uri("/v1/lock/states").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], json!([]));

    group.shutdown().await;
}

#[actix_web::test]
async fn test_requests_without_leader_are_unavailable() {
    let group = group(false).await;
    let app = app!(state(group.clone()));

    let (status, body) = post!(app, "/v1/ns/create", json!({"path": "/a"}));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], NOT_LEADER.code);

    // lock states are still served by replica 0
    let req = test::TestRequest::get().uri("/v1/lock/states").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    group.shutdown().await;
}

#[actix_web::test]
async fn test_cluster_leader_transfer_and_acceptors() {
    let group = group(true).await;
    let app = app!(state(group.clone()));

    let req = test::TestRequest::get().uri("/v1/cluster/status").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["leader"], 0);
    assert_eq!(body["data"]["acceptors"], 3);
    assert_eq!(body["data"]["replicas"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["replicas"][0]["role"], "leader");

    let req = test::TestRequest::put()
        .uri("/v1/cluster/leader?replicaId=1")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["replicaId"], 1);
    assert_eq!(group.leader_id(), Some(1));

    for replica in [1, 2] {
        let req = test::TestRequest::put()
            .uri(&format!("/v1/cluster/acceptor?replicaId={}&up=false", replica))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let (status, body) = post!(app, "/v1/ns/create", json!({"path": "/q"}));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], NO_QUORUM.code);

    let req = test::TestRequest::put()
        .uri("/v1/cluster/acceptor?replicaId=9&up=true")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    group.shutdown().await;
}

#[actix_web::test]
async fn test_metrics_disabled_without_recorder() {
    let group = group(false).await;
    let app = app!(state(group.clone()));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    group.shutdown().await;
}
