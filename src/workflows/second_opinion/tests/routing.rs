use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::second_opinion::assignment::AlgorithmSettings;
use crate::workflows::second_opinion::domain::CaseId;
use crate::workflows::second_opinion::lifecycle::CaseTransition;
use crate::workflows::second_opinion::repository::MemoryStore;
use crate::workflows::second_opinion::router::{self, second_opinion_router};
use crate::workflows::second_opinion::service::SecondOpinionService;

fn app() -> (Router, Arc<TestService>) {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    (second_opinion_router(service.clone()), service)
}

async fn post_json(router: &Router, uri: &str, body: Value) -> Response {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .expect("route executes")
}

async fn post_empty(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .expect("route executes")
}

async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .expect("route executes")
}

async fn open_case(router: &Router) -> String {
    let response = post_json(
        router,
        "/api/v1/cases",
        json!({
            "patient_ref": "PAT-0042",
            "specialty": "oncology",
            "cancer_type": "breast",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    body["id"].as_str().expect("case id").to_string()
}

#[tokio::test]
async fn open_case_returns_draft_with_available_transitions() {
    let (router, _) = app();
    let response = post_json(
        &router,
        "/api/v1/cases",
        json!({
            "patient_ref": "PAT-0042",
            "specialty": "oncology",
            "cancer_type": "breast",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "DRAFT");
    assert_eq!(body["available_transitions"], json!(["submit", "cancel"]));
}

#[tokio::test]
async fn out_of_order_transition_is_a_conflict() {
    let (router, _) = app();
    let case_id = open_case(&router).await;

    let response = post_empty(
        &router,
        &format!("/api/v1/cases/{case_id}/transitions/submit"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["case"]["status"], "SUBMITTED");

    let response = post_empty(
        &router,
        &format!("/api/v1/cases/{case_id}/transitions/close_deliberation"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn unknown_transition_is_a_bad_request() {
    let (router, _) = app();
    let case_id = open_case(&router).await;

    let response = post_empty(
        &router,
        &format!("/api/v1/cases/{case_id}/transitions/reopen"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_case_is_not_found() {
    let (router, _) = app();
    let response = get(&router, "/api/v1/cases/case-000404").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_accepts_reason_and_actor() {
    let (router, service) = app();
    let case_id = open_case(&router).await;

    let response = post_json(
        &router,
        &format!("/api/v1/cases/{case_id}/transitions/cancel"),
        json!({ "actor": "coordinator", "reason": "duplicate request" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let log = service.transition_log(&CaseId(case_id)).unwrap();
    assert_eq!(log[0].note.as_deref(), Some("duplicate request"));
    assert_eq!(log[0].actor.as_deref(), Some("coordinator"));
}

#[tokio::test]
async fn assignment_without_candidates_is_unprocessable() {
    let mut busy = physician("busy", 10, 365);
    busy.monthly_cap = 10;
    let (service, _, _) = build_service_with(vec![busy], settings());
    let router = second_opinion_router(Arc::new(service));
    let case_id = open_case(&router).await;
    post_empty(&router, &format!("/api/v1/cases/{case_id}/transitions/submit")).await;

    let response = post_empty(&router, &format!("/api/v1/cases/{case_id}/assignment")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn assignment_route_returns_audit_trail() {
    let (router, _) = app();
    let case_id = open_case(&router).await;
    post_empty(&router, &format!("/api/v1/cases/{case_id}/transitions/submit")).await;

    let response = post_empty(&router, &format!("/api/v1/cases/{case_id}/assignment")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["case"]["physician"], "c");
    assert_eq!(body["assignment"]["trail"].as_array().map(Vec::len), Some(3));

    let response = get(&router, &format!("/api/v1/cases/{case_id}/assignment/audit")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn disabled_override_is_forbidden() {
    let (service, _, _) = build_service_with(
        vec![physician("a", 0, 365), physician("b", 0, 365)],
        AlgorithmSettings {
            allow_overrides: false,
            ..settings()
        },
    );
    let router = second_opinion_router(Arc::new(service));
    let case_id = open_case(&router).await;
    post_empty(&router, &format!("/api/v1/cases/{case_id}/transitions/submit")).await;

    let response = post_json(
        &router,
        &format!("/api/v1/cases/{case_id}/assignment"),
        json!({
            "manual": {
                "physician": "b",
                "actor": "admin",
                "justification": "subspecialty match",
            }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn consensus_flow_over_http() {
    let (router, service) = app();
    let case_id = service_case_in_deliberation(&service).0;
    let base = format!("/api/v1/cases/{case_id}/consensus");

    let response = post_json(
        &router,
        &format!("{base}/proposals"),
        json!({ "author": "a", "text": "Breast-conserving surgery", "note": "initial" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json_body(response).await["version"], 1);

    let response = post_empty(&router, &format!("{base}/voting")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &router,
        &format!("{base}/votes"),
        json!({ "physician_id": "outsider", "vote": "aprueba" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    for member in ["a", "b", "c"] {
        let response = post_json(
            &router,
            &format!("{base}/votes"),
            json!({ "physician_id": member, "vote": "aprueba", "justification": "agree" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = post_json(
        &router,
        &format!("{base}/close"),
        json!({ "is_consensus": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["phase"], "CONSENSO");
    assert_eq!(body["evidence_level"], "alta");
    assert_eq!(body["locked"], true);

    let response = post_json(
        &router,
        &format!("{base}/votes"),
        json!({ "physician_id": "b", "vote": "contraindicado" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["retryable"], false);

    let response = get(&router, &base).await;
    let body = read_json_body(response).await;
    assert_eq!(body["votos_a_favor"], 3);
    assert_eq!(body["quorum_met"], true);

    let response = post_empty(
        &router,
        &format!("/api/v1/cases/{case_id}/transitions/close_deliberation"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn more_info_and_resume_routes() {
    let (router, service) = app();
    let case_id = service_case_in_deliberation(&service).0;
    let base = format!("/api/v1/cases/{case_id}/consensus");

    let response = post_json(
        &router,
        &format!("{base}/more-info"),
        json!({ "description": "Need updated mammography" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["phase"], "BLOQUEADO");

    let response = post_empty(&router, &format!("{base}/resume")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["phase"], "DISCUSION");
}

#[tokio::test]
async fn artifact_handler_rejects_out_of_phase_upload() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let case = service.open_case(intake()).expect("case opens");
    service
        .transition(&case.id, CaseTransition::Submit, None)
        .expect("submitted");

    let response = router::artifact_handler::<MemoryStore, RecordingPublisher>(
        State(service),
        Path(case.id.to_string()),
        axum::Json(
            serde_json::from_value(json!({ "kind": "signed_report", "reference": "s3://r" }))
                .unwrap(),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn store_outage_is_an_internal_error() {
    let service = Arc::new(SecondOpinionService::new(
        Arc::new(UnavailableStore),
        Arc::new(RecordingPublisher::default()),
    ));

    let response = router::case_handler::<UnavailableStore, RecordingPublisher>(
        State(service),
        Path("case-000001".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json_body(response).await["retryable"], true);
}
