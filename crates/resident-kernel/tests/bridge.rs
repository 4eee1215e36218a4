//! End-to-end request handling through the bridge.

mod common;

use common::{bridge, bridge_with, factory, files_in, get, send, unconfigured, Options, Probe};
use futures::channel::mpsc;
use futures::StreamExt;
use resident_kernel::resident_core::{
    IncomingRequest, Method, OutgoingBody, StatusCode, StreamFrame, UploadStatus, UploadedFile,
    INTERNAL_ERROR_BODY, NOT_CONFIGURED_BODY,
};
use resident_kernel::BootstrapError;

#[tokio::test]
async fn test_get_success() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_text(), "Success");
}

#[tokio::test]
async fn test_upload_with_empty_field() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());
    let request = IncomingRequest::post("/upload")
        .with_file(UploadedFile::ok("ok", "testOK.pdf", "application/pdf", b"%PDF-1.4".to_vec()))
        .with_file(UploadedFile::failed("err", "testErr.pdf", UploadStatus::NoFile));

    let response = get(&mut bridge, request).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body_text(), "Uploaded files: testOK.pdf,NULL");

    assert_eq!(files_in(dir.path()), 0);
    assert!(bridge.pending_uploads().is_empty());
    assert_eq!(bridge.last_quarantine().unwrap().uploads.removed, 1);
}

#[tokio::test]
async fn test_moved_upload_is_not_an_error() {
    let uploads = tempfile::tempdir().unwrap();
    let kept = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(uploads.path());
    let target = format!("/keep?to={}", kept.path().display());
    let request = IncomingRequest::from_target(Method::POST, &target)
        .with_file(UploadedFile::ok("doc", "invoice.pdf", "application/pdf", b"%PDF".to_vec()));

    let response = get(&mut bridge, request).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(kept.path().join("invoice.pdf").exists());

    let report = bridge.last_quarantine().unwrap();
    assert_eq!(report.uploads.already_gone, 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());
    let request = IncomingRequest::post("/json")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"a":1}"#);

    let response = get(&mut bridge, request).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body_text(), r#"Received JSON: {"a":1}"#);
}

#[tokio::test]
async fn test_urlencoded_form() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());
    let request = IncomingRequest::post("/form")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("user=grace");

    let response = get(&mut bridge, request).await;
    assert_eq!(response.body_text(), "user=grace");
}

#[tokio::test]
async fn test_unconfigured_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let mut bridge = unconfigured(dir.path());

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body_text(), NOT_CONFIGURED_BODY);
    assert!(!bridge.is_configured());
    assert!(bridge.static_directory().is_none());
}

#[tokio::test]
async fn test_unknown_bootstrap_leaves_bridge_unconfigured() {
    let dir = tempfile::tempdir().unwrap();
    let mut bridge = unconfigured(dir.path());

    let err = bridge
        .bootstrap(&factory(Options::default(), Probe::default()), "laravel", "prod", false)
        .unwrap_err();
    assert!(matches!(err, BootstrapError::NotFound { .. }));

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.body_text(), NOT_CONFIGURED_BODY);
}

#[tokio::test]
async fn test_header_merge_keeps_both_sources() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());

    let response = get(&mut bridge, IncomingRequest::get("/headers")).await;
    let values: Vec<&str> = response.headers.get_all("X").collect();
    assert_eq!(values, vec!["1", "2"]);
}

#[tokio::test]
async fn test_response_cookie_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());

    let response = get(&mut bridge, IncomingRequest::get("/cookie")).await;
    assert_eq!(
        response.headers.get("set-cookie"),
        Some("pref=compact; Path=/; Domain=shop.example; HttpOnly; SameSite=Lax")
    );
}

#[tokio::test]
async fn test_streamed_chunks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());

    let (response, frames) = send(&mut bridge, IncomingRequest::from_target(Method::GET, "/stream?n=4")).await;

    assert_eq!(
        response.body,
        OutgoingBody::Streamed {
            chunks: 4,
            bytes: 20,
            complete: true,
        }
    );
    let data: Vec<&[u8]> = frames
        .iter()
        .filter_map(|frame| match frame {
            StreamFrame::Data(chunk) => Some(chunk.as_slice()),
            _ => None,
        })
        .collect();
    assert_eq!(data, vec![&b"part1"[..], &b"part2"[..], &b"part3"[..], &b"part4"[..]]);
    assert!(matches!(frames.first(), Some(StreamFrame::Head { .. })));
    assert_eq!(frames.last(), Some(&StreamFrame::End));
}

#[tokio::test]
async fn test_streamed_through_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());
    let (tx, rx) = mpsc::unbounded();

    let response = bridge
        .handle(IncomingRequest::from_target(Method::GET, "/stream?n=2"), tx)
        .await;
    assert!(response.is_streamed());

    let frames: Vec<StreamFrame> = rx.collect().await;
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[2], StreamFrame::Data(b"part2".to_vec()));
}

#[tokio::test]
async fn test_handler_error_then_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, _) = bridge(dir.path());

    let failed = get(&mut bridge, IncomingRequest::get("/fail")).await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.body_text(), INTERNAL_ERROR_BODY);

    let panicked = get(&mut bridge, IncomingRequest::get("/panic")).await;
    assert_eq!(panicked.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(panicked.body_text(), INTERNAL_ERROR_BODY);

    let ok = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(ok.body_text(), "Success");
    assert_eq!(bridge.requests_served(), 3);
}

#[tokio::test]
async fn test_mapping_failure_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone");
    let (mut bridge, probe) = bridge(&missing);
    let request = IncomingRequest::post("/upload")
        .with_file(UploadedFile::ok("doc", "a.txt", "text/plain", b"x".to_vec()));

    let response = get(&mut bridge, request).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(probe.events().is_empty());
    assert_eq!(bridge.last_quarantine().unwrap().actions_run, 3);
}

#[tokio::test]
async fn test_hook_and_terminate_order() {
    let dir = tempfile::tempdir().unwrap();
    let (mut bridge, probe) = bridge(dir.path());

    get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(
        probe.events(),
        vec!["pre /get", "handle /get", "terminate /get", "post /get 200"]
    );
    assert_eq!(probe.resets(), vec!["first", "last"]);
}

#[tokio::test]
async fn test_pre_handle_failure_skips_application() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        fail_pre_handle: true,
        ..Default::default()
    };
    let (mut bridge, probe) = bridge_with(dir.path(), options);

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(probe.events(), vec!["pre /get"]);
    assert_eq!(probe.resets(), vec!["first", "last"]);
}

#[tokio::test]
async fn test_terminate_failure_does_not_change_response() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        fail_terminate: true,
        ..Default::default()
    };
    let (mut bridge, probe) = bridge_with(dir.path(), options);

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(probe.events().contains(&"post /get 200".to_string()));
}

#[tokio::test]
async fn test_stacked_middleware() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        stacked: true,
        ..Default::default()
    };
    let (mut bridge, probe) = bridge_with(dir.path(), options);

    let response = get(&mut bridge, IncomingRequest::get("/get")).await;
    assert_eq!(response.headers.get("x-powered-by"), Some("fixture"));
    assert!(probe.events().contains(&"terminate /get".to_string()));
}

#[tokio::test]
async fn test_rebuild_between_requests() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Probe::default();
    let factory = factory(Options::default(), probe.clone());
    let mut bridge = unconfigured(dir.path());
    bridge.bootstrap(&factory, "fixture", "test", false).unwrap();

    let before = get(&mut bridge, IncomingRequest::get("/whoami")).await;
    assert!(before.body_text().ends_with("build=1"));

    bridge.rebuild(&factory).unwrap();
    let after = get(&mut bridge, IncomingRequest::get("/whoami")).await;
    assert!(after.body_text().ends_with("build=2"));
    assert!(probe.events().contains(&"released".to_string()));
}

#[tokio::test]
async fn test_rebuild_requires_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let mut bridge = unconfigured(dir.path());
    let err = bridge
        .rebuild(&factory(Options::default(), Probe::default()))
        .unwrap_err();
    assert!(matches!(err, BootstrapError::NotBootstrapped));
}
