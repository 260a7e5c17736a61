//! HTTP surface tests. The router runs against the in-memory store and a
//! temporary storage folder.

mod common;

use axum::body::Body;
use axum::http::{header, request, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use certhub::auth::{Caller, Role, INSTITUTION_HEADER, NAME_HEADER, ROLE_HEADER, USER_ID_HEADER};
use certhub::config::Config;
use certhub::hashing::sha256_hex;
use certhub::routes;
use certhub::state::AppState;
use certhub::templates;

use common::harness;

struct TestApp {
    router: Router,
    institution_id: Uuid,
    issuer: Caller,
    admin: Caller,
    _storage: TempDir,
}

async fn app() -> Option<TestApp> {
    let h = harness().await?;
    let state = Arc::new(AppState {
        service: Arc::new(h.service),
        config: Arc::new(Config::default()),
        tera: Arc::new(templates::load().unwrap()),
    });
    Some(TestApp {
        router: routes::router(state),
        institution_id: h.institution.id,
        issuer: h.issuer,
        admin: h.admin,
        _storage: h.storage_dir,
    })
}

fn as_caller(builder: request::Builder, caller: &Caller) -> request::Builder {
    let role = match caller.role {
        Role::Admin => "admin",
        Role::Institution => "institution",
        Role::User => "user",
    };
    let builder = builder
        .header(USER_ID_HEADER, caller.user_id.to_string())
        .header(ROLE_HEADER, role)
        .header(NAME_HEADER, caller.display_name.as_str());
    match caller.institution_id {
        Some(id) => builder.header(INSTITUTION_HEADER, id.to_string()),
        None => builder,
    }
}

fn json_request(method: Method, uri: &str, caller: &Caller, body: Value) -> Request<Body> {
    as_caller(Request::builder().method(method).uri(uri), caller)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

async fn send_json(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn certificate_body(institution_id: Uuid) -> Value {
    json!({
        "institution_id": institution_id,
        "title": "Certificate of Completion",
        "recipient_name": "Jane Doe",
        "recipient_email": "jane@example.org",
        "issue_date": "2024-01-01"
    })
}

async fn issue(app: &TestApp) -> Value {
    let req = json_request(
        Method::POST,
        "/api/certificates",
        &app.issuer,
        certificate_body(app.institution_id),
    );
    let (status, body) = send_json(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn health_check() {
    let Some(app) = app().await else { return };
    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_is_rejected() {
    let Some(app) = app().await else { return };
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/certificates")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(certificate_body(app.institution_id).to_string()))
        .unwrap();

    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers["x-error-code"], "AUTH_REQUIRED");
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn issue_and_verify_over_http() {
    let Some(app) = app().await else { return };
    let issued = issue(&app).await;
    let token = issued["certificate"]["verification_id"].as_str().unwrap().to_string();
    let id = issued["certificate"]["id"].as_str().unwrap().to_string();
    let hash = issued["certificate"]["content_hash"].as_str().unwrap().to_string();
    assert!(issued["verification_url"].as_str().unwrap().ends_with(&token));

    let (status, view) = send_json(&app, get(&format!("/api/verify/{}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["recipient_name"], "Jane Doe");
    assert_eq!(view["status"], "issued");
    assert_eq!(view["valid"], true);
    assert!(view.get("recipient_email").is_none());

    let (status, headers, page) = send(&app, get(&format!("/verify/{}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    let page = String::from_utf8(page).unwrap();
    assert!(page.contains("Jane Doe"));
    assert!(page.contains("Acme University"));
    assert!(page.contains(&hash));

    let (status, headers, artifact) =
        send(&app, get(&format!("/verify/{}/artifact", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(sha256_hex(&artifact), hash);

    let (status, report) =
        send_json(&app, get(&format!("/api/verify/{}/integrity", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["intact"], true);

    let req = as_caller(Request::builder().uri(format!("/api/certificates/{}", id)), &app.issuer)
        .body(Body::empty())
        .unwrap();
    let (status, cert) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cert["verification_id"].as_str(), Some(token.as_str()));
    assert_eq!(cert["recipient_email"], "jane@example.org");
}

#[tokio::test]
async fn unknown_tokens_are_404() {
    let Some(app) = app().await else { return };
    issue(&app).await;

    let (status, body) = send_json(&app, get("/api/verify/not-a-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _, page) = send(&app, get("/verify/ffffffffffffffff")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8(page).unwrap().contains("Certificate not found"));

    let (status, _, _) = send(&app, get("/verify/ffffffffffffffff/artifact")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = as_caller(Request::builder().uri("/api/certificates/not-a-uuid"), &app.admin)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_failures_list_fields() {
    let Some(app) = app().await else { return };
    let mut body = certificate_body(app.institution_id);
    body["issue_date"] = json!("2024-06-01");
    body["expiry_date"] = json!("2024-01-01");

    let req = json_request(Method::POST, "/api/certificates", &app.issuer, body);
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"]["fields"][0]["field"], "expiry_date");

    let req = as_caller(
        Request::builder().uri(format!("/api/institutions/{}/certificates", app.institution_id)),
        &app.issuer,
    )
    .body(Body::empty())
    .unwrap();
    let (status, list) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn patch_revokes_but_rejects_identity_changes() {
    let Some(app) = app().await else { return };
    let issued = issue(&app).await;
    let id = issued["certificate"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/certificates/{}", id);

    let req = json_request(
        Method::PATCH,
        &uri,
        &app.issuer,
        json!({ "verification_id": "0000000000000000" }),
    );
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST_BODY");

    let req = json_request(Method::PATCH, &uri, &app.issuer, json!({ "status": "revoked" }));
    let (status, cert) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cert["status"], "revoked");
    assert_eq!(cert["verification_id"], issued["certificate"]["verification_id"]);

    let req = json_request(Method::PATCH, &uri, &app.issuer, json!({ "status": "issued" }));
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn other_institutions_are_forbidden() {
    let Some(app) = app().await else { return };
    let issued = issue(&app).await;
    let id = issued["certificate"]["id"].as_str().unwrap().to_string();
    let outsider = Caller::institution(Uuid::new_v4(), Uuid::new_v4(), "Elsewhere");

    let req = as_caller(Request::builder().uri(format!("/api/certificates/{}", id)), &outsider)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let req = json_request(
        Method::POST,
        "/api/institutions",
        &app.issuer,
        json!({ "name": "Rogue College" }),
    );
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_creates_institution_and_reads_activity() {
    let Some(app) = app().await else { return };
    let req = json_request(
        Method::POST,
        "/api/institutions",
        &app.admin,
        json!({ "name": "Northwind Institute" }),
    );
    let (status, institution) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let new_id = institution["id"].as_str().unwrap().to_string();

    let mut activity = Value::Null;
    for _ in 0..100 {
        let req = as_caller(
            Request::builder().uri(format!("/api/institutions/{}/activity", new_id)),
            &app.admin,
        )
        .body(Body::empty())
        .unwrap();
        let (status, body) = send_json(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        if body.as_array().map_or(false, |a| !a.is_empty()) {
            activity = body;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(activity[0]["action"], "institution_created");
}

fn multipart_body(boundary: &str, metadata: &Value, file: Option<&[u8]>) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n{m}\r\n",
        b = boundary,
        m = metadata
    )
    .into_bytes();
    if let Some(bytes) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"diploma.pdf\"\r\nContent-Type: application/pdf\r\n\r\n",
                boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

fn upload_request(app: &TestApp, body: Vec<u8>, boundary: &str) -> Request<Body> {
    as_caller(
        Request::builder()
            .method(Method::POST)
            .uri("/api/certificates/upload"),
        &app.issuer,
    )
    .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", boundary),
    )
    .body(Body::from(body))
    .unwrap()
}

#[tokio::test]
async fn multipart_upload_keeps_file_bytes() {
    let Some(app) = app().await else { return };
    let boundary = "certhub-boundary";
    let file = b"%PDF-1.4 issued by the registrar".to_vec();
    let metadata = certificate_body(app.institution_id);

    let req = upload_request(&app, multipart_body(boundary, &metadata, Some(&file)), boundary);
    let (status, issued) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{}", issued);
    assert_eq!(issued["certificate"]["content_hash"], sha256_hex(&file));

    let token = issued["certificate"]["verification_id"].as_str().unwrap();
    let (status, _, artifact) = send(&app, get(&format!("/verify/{}/artifact", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifact, file);

    let req = upload_request(&app, multipart_body(boundary, &metadata, None), boundary);
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"]["fields"][0]["field"], "file");
}
