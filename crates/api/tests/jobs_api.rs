//! Integration tests for job admission, inspection and control.

mod common;

use axum::http::StatusCode;
use common::{body_json, claim, create_job, get, job_json, job_request, post, post_json, succeed};
use serde_json::json;

fn single_step() -> serde_json::Value {
    json!([{ "serviceID": "svc-a" }])
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_job_returns_201_with_accepted_job() {
    let (app, _) = common::build_test_app();
    let mut request = job_request(single_step(), &["g1", "g2"]);
    request["stagingLocation"] = json!("s3://staging/joe/");
    request["collectionIds"] = json!(["C123-PROV"]);

    let response = post_json(&app, "/jobs", request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let job = &json["data"];
    assert!(job["jobID"].is_string());
    assert_eq!(job["status"], "accepted");
    assert_eq!(job["progress"], 0);
    assert_eq!(job["numInputGranules"], 2);
    assert_eq!(job["username"], "joe");
    assert_eq!(job["collectionIds"], json!(["C123-PROV"]));
    assert_eq!(job["links"][0]["rel"], "s3-access");
    assert_eq!(job["links"][0]["href"], "s3://staging/joe/");
}

#[tokio::test]
async fn create_job_rejects_invalid_request_with_all_errors() {
    let (app, _) = common::build_test_app();
    let response = post_json(
        &app,
        "/jobs",
        json!({ "username": "joe", "request": "not a url", "steps": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("Job request must be a URL"), "{message}");
    assert!(message.contains("at least one workflow step"), "{message}");
}

#[tokio::test]
async fn create_job_rejects_aggregating_first_step() {
    let (app, _) = common::build_test_app();
    let response = post_json(
        &app,
        "/jobs",
        job_request(json!([{ "serviceID": "svc-a", "hasAggregatedOutput": true }]), &["g1"]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_job_rejects_malformed_json() {
    let (app, _) = common::build_test_app();
    let response = post_json(&app, "/jobs", json!({ "username": "joe" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

async fn job_with_collections(app: &axum::Router, collections: serde_json::Value) -> String {
    let mut request = job_request(single_step(), &["g1"]);
    request["collectionIds"] = collections;
    create_job(app, request).await
}

#[tokio::test]
async fn viewer_sees_job_only_when_results_are_shareable() {
    let (app, _) = common::build_test_app();
    let private = job_with_collections(&app, json!(["C-EULA"])).await;
    let open = job_with_collections(&app, json!(["C-OPEN"])).await;

    let response = get(&app, &format!("/jobs/{private}?viewer=alice")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = get(&app, &format!("/jobs/{open}?viewer=alice")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["jobID"], open.as_str());
}

#[tokio::test]
async fn owner_and_admin_see_private_jobs() {
    let (app, _) = common::build_test_app();
    let private = job_with_collections(&app, json!(["C-EULA"])).await;

    for viewer in ["joe", "admin"] {
        let response = get(&app, &format!("/jobs/{private}?viewer={viewer}")).await;
        assert_eq!(response.status(), StatusCode::OK, "viewer {viewer}");
    }
}

#[tokio::test]
async fn get_unknown_job_returns_404() {
    let (app, _) = common::build_test_app();
    let response = get(&app, &format!("/jobs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn get_job_with_invalid_id_returns_400() {
    let (app, _) = common::build_test_app();
    let response = get(&app, "/jobs/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_jobs_filters_by_username_and_status() {
    let (app, _) = common::build_test_app();
    let first = create_job(&app, job_request(single_step(), &["g1"])).await;
    let mut other = job_request(single_step(), &["g1"]);
    other["username"] = json!("ann");
    create_job(&app, other).await;
    claim(&app, "svc-a").await.unwrap();

    let json = body_json(get(&app, "/jobs?username=joe").await).await;
    let jobs = json["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["jobID"], first.as_str());

    let json = body_json(get(&app, "/jobs?status=running").await).await;
    let jobs = json["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["jobID"], first.as_str());

    let json = body_json(get(&app, "/jobs?limit=1").await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn list_jobs_rejects_unknown_status() {
    let (app, _) = common::build_test_app();
    let response = get(&app, "/jobs?status=exploded").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn steps_and_items_are_listed_in_order() {
    let (app, _) = common::build_test_app();
    let job_id = create_job(
        &app,
        job_request(
            json!([
                { "serviceID": "svc-a", "operation": { "format": "image/png" } },
                { "serviceID": "svc-b", "hasAggregatedOutput": true }
            ]),
            &["g1", "g2", "g3"],
        ),
    )
    .await;

    let json = body_json(get(&app, &format!("/jobs/{job_id}/workflow-steps")).await).await;
    let steps = json["data"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["serviceID"], "svc-a");
    assert_eq!(steps[0]["workItemCount"], 3);
    assert_eq!(steps[0]["operation"]["format"], "image/png");
    assert_eq!(steps[1]["workItemCount"], 1);
    assert_eq!(steps[1]["hasAggregatedOutput"], true);

    let json = body_json(get(&app, &format!("/jobs/{job_id}/work-items")).await).await;
    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i["status"] == "ready"));
    assert_eq!(items[0]["inputs"], json!(["g1"]));
}

#[tokio::test]
async fn steps_of_unknown_job_return_404() {
    let (app, _) = common::build_test_app();
    let id = uuid::Uuid::new_v4();
    let response = get(&app, &format!("/jobs/{id}/workflow-steps")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(&app, &format!("/jobs/{id}/work-items")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_and_resume_running_job() {
    let (app, _) = common::build_test_app();
    let job_id = create_job(&app, job_request(single_step(), &["g1", "g2"])).await;
    claim(&app, "svc-a").await.unwrap();

    let response = post(&app, &format!("/jobs/{job_id}/pause")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "paused");
    assert!(claim(&app, "svc-a").await.is_none());

    let response = post(&app, &format!("/jobs/{job_id}/pause")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post(&app, &format!("/jobs/{job_id}/resume")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "running");
    assert!(claim(&app, "svc-a").await.is_some());
}

#[tokio::test]
async fn resume_of_running_job_is_a_conflict() {
    let (app, _) = common::build_test_app();
    let job_id = create_job(&app, job_request(single_step(), &["g1"])).await;
    claim(&app, "svc-a").await.unwrap();

    let response = post(&app, &format!("/jobs/{job_id}/resume")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["error"],
        "Job status is running - only paused jobs can be resumed."
    );
}

#[tokio::test]
async fn cancel_cancels_remaining_items() {
    let (app, _) = common::build_test_app();
    let job_id = create_job(&app, job_request(single_step(), &["g1", "g2"])).await;
    let running = claim(&app, "svc-a").await.unwrap();

    let response = post(&app, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "canceled");
    assert_eq!(job["message"], "The job was canceled");

    let json = body_json(get(&app, &format!("/jobs/{job_id}/work-items")).await).await;
    assert!(json["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|i| i["status"] == "canceled"));

    let response = succeed(&app, running["id"].as_i64().unwrap(), &["late"]).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post(&app, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["error"],
        "Job status cannot be updated from canceled to canceled."
    );
}

#[tokio::test]
async fn cancel_of_accepted_job_is_a_conflict() {
    let (app, _) = common::build_test_app();
    let job_id = create_job(&app, job_request(single_step(), &["g1"])).await;
    let response = post(&app, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(job_json(&app, &job_id).await["status"], "accepted");
}

#[tokio::test]
async fn preview_job_skips_preview_into_running() {
    let (app, _) = common::build_test_app();
    let mut request = job_request(single_step(), &["g1", "g2"]);
    request["preview"] = json!(true);
    let job_id = create_job(&app, request).await;

    claim(&app, "svc-a").await.unwrap();
    assert_eq!(job_json(&app, &job_id).await["status"], "previewing");

    let response = post(&app, &format!("/jobs/{job_id}/skip-preview")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "running");

    let response = post(&app, &format!("/jobs/{job_id}/skip-preview")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn control_of_unknown_job_returns_404() {
    let (app, _) = common::build_test_app();
    let response = post(&app, &format!("/jobs/{}/pause", uuid::Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
