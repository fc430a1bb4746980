use std::collections::HashMap;

use super::*;
use request::{HeadError, parse_request_line};
use serde_json::Value;

const CONTAINER: &str = "https://acct.blob.core.windows.net/container";

fn sample_runtime() -> SharedRuntime {
    Arc::new(SkillRuntime::new(
        SkillContext::new("LabelCounter"),
        ContainerLocation::new(CONTAINER),
    ))
}

fn keyed_runtime(key: &str) -> SharedRuntime {
    Arc::new(
        SkillRuntime::new(
            SkillContext::new("LabelCounter"),
            ContainerLocation::new(CONTAINER),
        )
        .with_function_key(Some(key.to_string())),
    )
}

fn http_request(method: &str, target: &str, body: &str) -> HttpRequest {
    let mut headers = HashMap::new();
    if !body.is_empty() {
        headers.insert("content-type".to_string(), "application/json".to_string());
    }
    HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        headers,
        body: body.as_bytes().to_vec(),
    }
}

const SKILL_BODY: &str = r#"{
    "values": [
        {
            "recordId": "r1",
            "data": {
                "label": [ {"label": "Job Carts"}, {"label": "Job Carts"}, {"label": "Forklift"} ],
                "image_url": "https://x/container/folder1/img001.png"
            }
        },
        {
            "recordId": "r2",
            "data": { "label": [] }
        }
    ]
}"#;

#[test]
fn skill_route_enriches_records_in_order() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("POST", "/api/LabelCounter", SKILL_BODY));

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "application/json");
    let body: Value = serde_json::from_str(&response.body).unwrap();
    let values = body["values"].as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["recordId"], "r1");
    assert_eq!(values[0]["data"]["jobCartCount"], 2);
    assert_eq!(
        values[0]["data"]["blobUri"],
        "https://acct.blob.core.windows.net/container/folder1/img001.png"
    );
    assert_eq!(values[0]["errors"], serde_json::json!([]));
    assert_eq!(values[0]["warnings"], serde_json::json!([]));
    assert_eq!(values[1]["recordId"], "r2");
    assert_eq!(values[1]["errors"].as_array().unwrap().len(), 1);
}

#[test]
fn skill_route_matches_name_case_insensitively_and_accepts_get() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("GET", "/api/labelcounter", SKILL_BODY));
    assert_eq!(response.status, 200);
}

#[test]
fn skill_route_rejects_missing_values_with_skill_diagnostic() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("POST", "/api/LabelCounter", "{}"));

    assert_eq!(response.status, 400);
    assert_eq!(response.content_type, "text/plain; charset=utf-8");
    assert_eq!(response.body, "LabelCounter - Invalid request record array.");
}

#[test]
fn skill_route_rejects_empty_body() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("POST", "/api/LabelCounter", ""));
    assert_eq!(response.status, 400);
    assert_eq!(response.body, "LabelCounter - Invalid request record array.");
}

#[test]
fn skill_route_rejects_non_json_content_type() {
    let runtime = sample_runtime();
    let mut req = http_request("POST", "/api/LabelCounter", SKILL_BODY);
    req.headers
        .insert("content-type".to_string(), "text/plain".to_string());
    let response = handle_request(&runtime, &req);
    assert_eq!(response.status, 400);
    assert!(response.body.contains("application/json"));
}

#[test]
fn skill_route_rejects_unsupported_method() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("DELETE", "/api/LabelCounter", ""));
    assert_eq!(response.status, 405);
}

#[test]
fn unknown_skill_name_is_not_found() {
    let runtime = sample_runtime();
    let response = handle_request(&runtime, &http_request("POST", "/api/OtherSkill", SKILL_BODY));
    assert_eq!(response.status, 404);
}

#[test]
fn function_key_is_required_when_configured() {
    let runtime = keyed_runtime("k3y==");

    let denied = handle_request(&runtime, &http_request("POST", "/api/LabelCounter", SKILL_BODY));
    assert_eq!(denied.status, 401);
    assert!(denied.body.contains("missing function key"));

    let mut with_header = http_request("POST", "/api/LabelCounter", SKILL_BODY);
    with_header
        .headers
        .insert("x-functions-key".to_string(), "k3y==".to_string());
    assert_eq!(handle_request(&runtime, &with_header).status, 200);

    let with_query = http_request("POST", "/api/LabelCounter?code=k3y%3D%3D", SKILL_BODY);
    assert_eq!(handle_request(&runtime, &with_query).status, 200);

    let wrong = handle_request(
        &runtime,
        &http_request("POST", "/api/LabelCounter?code=k3y=!", SKILL_BODY),
    );
    assert_eq!(wrong.status, 401);
    assert!(wrong.body.contains("invalid function key"));
}

#[test]
fn health_and_metrics_respond() {
    let runtime = sample_runtime();
    let health = handle_request(&runtime, &http_request("GET", "/health", ""));
    assert_eq!(health.status, 200);
    assert_eq!(health.body, r#"{"status":"ok"}"#);

    let not_allowed = handle_request(&runtime, &http_request("POST", "/health", "{}"));
    assert_eq!(not_allowed.status, 405);

    let metrics = handle_request(&runtime, &http_request("GET", "/metrics", ""));
    assert_eq!(metrics.status, 200);
    assert!(metrics.body.contains("label_skill_requests_total 0"));
}

#[test]
fn metrics_reflect_processed_and_rejected_requests() {
    let runtime = sample_runtime();
    handle_request(&runtime, &http_request("POST", "/api/LabelCounter", SKILL_BODY));
    handle_request(&runtime, &http_request("POST", "/api/LabelCounter", "{}"));

    let metrics = handle_request(&runtime, &http_request("GET", "/metrics", "")).body;
    assert!(metrics.contains("label_skill_requests_total 2"));
    assert!(metrics.contains("label_skill_malformed_requests_total 1"));
    assert!(metrics.contains("label_skill_records_enriched_total 2"));
    assert!(metrics.contains("label_skill_record_errors_total 1"));
    assert!(metrics.contains("label_skill_record_warnings_total 0"));
}

#[test]
fn split_target_decodes_query_pairs() {
    let (path, query) = request::split_target("/api/LabelCounter?code=a%2Bb&x");
    assert_eq!(path, "/api/LabelCounter");
    assert_eq!(query.get("code").map(String::as_str), Some("a+b"));
    assert_eq!(query.get("x").map(String::as_str), Some(""));
}

#[test]
fn parse_request_line_accepts_only_origin_form_http1() {
    assert!(parse_request_line("GET /health HTTP/2").is_err());
    assert!(parse_request_line("GET").is_err());
    assert!(parse_request_line("GET /health HTTP/1.1 extra").is_err());
    assert!(parse_request_line("GET http://host/health HTTP/1.1").is_err());
    assert_eq!(
        parse_request_line("POST /api/LabelCounter HTTP/1.1\r\n").unwrap(),
        ("POST".to_string(), "/api/LabelCounter".to_string())
    );
}

#[test]
fn request_head_rejects_too_many_headers() {
    let header_lines: Vec<String> = (0..65).map(|i| format!("x-extra-{i}: v")).collect();
    let err = RequestHead::parse(
        "POST /api/LabelCounter HTTP/1.1",
        header_lines.iter().map(String::as_str),
    )
    .unwrap_err();
    assert!(matches!(err, HeadError::TooManyHeaders));
    assert_eq!(err.response().status, 400);
}

#[test]
fn request_head_rejects_overlong_lines() {
    let long_target = format!("GET /{} HTTP/1.1", "a".repeat(9 * 1024));
    assert!(matches!(
        parse_request_line(&long_target),
        Err(HeadError::LineTooLong)
    ));

    let long_header = format!("x-long: {}", "v".repeat(9 * 1024));
    let err = RequestHead::parse("GET /health HTTP/1.1", [long_header.as_str()].into_iter())
        .unwrap_err();
    assert!(matches!(err, HeadError::LineTooLong));
}

#[test]
fn request_head_rejects_chunked_bodies() {
    let err = RequestHead::parse(
        "POST /api/LabelCounter HTTP/1.1",
        ["Transfer-Encoding: chunked"].into_iter(),
    )
    .unwrap_err();
    assert!(matches!(err, HeadError::UnsupportedTransferEncoding));
}

#[test]
fn request_head_maps_oversized_body_to_payload_too_large() {
    let err = RequestHead::parse(
        "POST /api/LabelCounter HTTP/1.1",
        ["Content-Length: 20000000"].into_iter(),
    )
    .unwrap_err();
    assert!(matches!(err, HeadError::BodyTooLarge));
    let response = err.response();
    assert_eq!(response.status, 413);
    assert!(
        http::render_response_text(&response).starts_with("HTTP/1.1 413 Payload Too Large")
    );
}

#[test]
fn backpressure_response_is_service_unavailable() {
    let response = http::backpressure_rejection_response();
    assert_eq!(response.status, 503);
    assert!(
        http::render_response_text(&response).starts_with("HTTP/1.1 503 Service Unavailable")
    );
}
