#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use stepflow_api::catalog::StaticCollectionCatalog;
use stepflow_api::config::ServerConfig;
use stepflow_api::router::build_app_router;
use stepflow_api::state::AppState;
use stepflow_db::{MemoryWorkStore, WorkStore};
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses a page size of 10 so paged enumeration needs only a few items.
/// `admin` is an admin and `C-OPEN` is the only shareable collection.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_page_size: 10,
        job_reaper_interval_secs: 60,
        job_reaper_stale_minutes: 60,
        database_url: None,
        admin_usernames: vec!["admin".to_string()],
        open_collection_ids: vec!["C-OPEN".to_string()],
    }
}

/// Build the full application router over a fresh in-memory store.
///
/// Returns the store too so tests can inspect state directly.
pub fn build_test_app() -> (Router, Arc<dyn WorkStore>) {
    let config = test_config();
    let store: Arc<dyn WorkStore> = Arc::new(MemoryWorkStore::new());
    let state = AppState {
        store: Arc::clone(&store),
        catalog: Arc::new(StaticCollectionCatalog::new(
            config.open_collection_ids.iter().cloned(),
        )),
        config: Arc::new(config.clone()),
    };
    (build_app_router(state, &config), store)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<&Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(json).unwrap())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Send a GET request to the given URI.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: &Router, uri: &str, json: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(&json)).await
}

/// Send a POST request with no body.
pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

/// Send a PUT request with a JSON body.
pub async fn put_json(app: &Router, uri: &str, json: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(&json)).await
}

/// Send a PUT request with a raw string body labelled as JSON.
pub async fn put_raw(app: &Router, uri: &str, raw: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(raw.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A job request running `steps` over `inputs`.
pub fn job_request(steps: Value, inputs: &[&str]) -> Value {
    serde_json::json!({
        "username": "joe",
        "request": "http://example.com/harmony?foo=bar",
        "steps": steps,
        "inputs": inputs,
    })
}

/// Admit a job and return its `jobID`.
pub async fn create_job(app: &Router, request: Value) -> String {
    let response = post_json(app, "/jobs", request).await;
    assert_eq!(response.status(), 201);
    let json = body_json(response).await;
    json["data"]["jobID"].as_str().unwrap().to_string()
}

/// Claim the next work item for `service`, returning the item JSON.
pub async fn claim(app: &Router, service: &str) -> Option<Value> {
    let response = get(app, &format!("/service/work?serviceID={service}&podName=pod-1")).await;
    if response.status() == 404 {
        return None;
    }
    assert_eq!(response.status(), 200);
    Some(body_json(response).await["workItem"].clone())
}

/// Report a successful outcome for work item `id`.
pub async fn succeed(app: &Router, id: i64, results: &[&str]) -> Response<Body> {
    put_json(
        app,
        &format!("/service/work/{id}"),
        serde_json::json!({ "status": "successful", "results": results }),
    )
    .await
}

/// Fetch a job's JSON representation.
pub async fn job_json(app: &Router, job_id: &str) -> Value {
    let response = get(app, &format!("/jobs/{job_id}")).await;
    assert_eq!(response.status(), 200);
    body_json(response).await["data"].clone()
}
