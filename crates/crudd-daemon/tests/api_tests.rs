// SPDX-License-Identifier: MIT OR Apache-2.0
//! Router-level tests driven through `tower::ServiceExt::oneshot`.
#![cfg(unix)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use crudd_catalog::{Catalog, CommandSpec};
use crudd_daemon::{AppState, RunSettings, build_app};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_catalog() -> Catalog {
    Catalog::new([
        CommandSpec::new("echo", "/bin/echo", "fake command output"),
        CommandSpec::new("markup", "/bin/echo", "<b>&</b>"),
        CommandSpec::new("bare", "/bin/echo", ""),
        CommandSpec::new("failing", "/bin/sh", "-c false"),
        CommandSpec::new("sleeper", "/bin/sleep", "30"),
        CommandSpec::new("ghost", "/definitely/not/installed", "--flag"),
    ])
    .unwrap()
    .probe(None)
}

fn app_with(settings: RunSettings) -> Router {
    build_app(Arc::new(AppState::new(test_catalog(), settings)))
}

fn app() -> Router {
    app_with(RunSettings::default())
}

async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Index page
// ---------------------------------------------------------------------------

#[tokio::test]
async fn index_renders_title_and_footer() {
    let resp = get(app(), "/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(ct.starts_with("text/html"), "{ct}");

    let body = body_text(resp).await;
    assert!(body.contains("<title>CRUDD</title>"));
    assert!(!body.contains("failed to execute template"));
    assert!(body.contains(r#"<div class="copyright">"#));
}

#[tokio::test]
async fn index_separates_existing_and_missing_commands() {
    let body = body_text(get(app(), "/").await).await;
    assert!(body.contains(r#"<a href="/echo""#));
    assert!(!body.contains(r#"<a href="/ghost""#));
    assert!(body.contains(">ghost</span>"));
    assert!(body.contains("Unavailable commands (1)"));
}

#[tokio::test]
async fn index_escapes_command_titles() {
    let body = body_text(get(app(), "/").await).await;
    assert!(body.contains("/bin/echo &lt;b&gt;&amp;&lt;/b&gt;"));
}

// ---------------------------------------------------------------------------
// 2. Command pages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_page_streams_output_and_exit_code() {
    let resp = get(app(), "/echo").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );

    let body = body_text(resp).await;
    assert!(body.contains("<title>CRUDD - /bin/echo fake command output</title>"));
    assert!(body.contains("<pre>fake command output\n"), "{body}");
    assert!(body.contains("\nCommand exited with code: 0</pre>"), "{body}");
    assert!(body.contains(r#"<div class="copyright">"#));
    assert!(!body.contains("failed to execute template"));
}

#[tokio::test]
async fn command_output_is_escaped() {
    let body = body_text(get(app(), "/markup").await).await;
    assert!(body.contains("<pre>&lt;b&gt;&amp;&lt;/b&gt;\n"), "{body}");
}

#[tokio::test]
async fn command_without_arguments_runs() {
    let body = body_text(get(app(), "/bare").await).await;
    assert!(body.contains("<title>CRUDD - /bin/echo</title>"));
    assert!(body.contains("<pre>\n\nCommand exited with code: 0"), "{body}");
}

#[tokio::test]
async fn nonzero_exit_code_is_rendered() {
    let body = body_text(get(app(), "/failing").await).await;
    assert!(body.contains("Command exited with code: 1"), "{body}");
}

#[tokio::test]
async fn missing_executable_still_renders_a_page() {
    let resp = get(app(), "/ghost").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("failed to run /definitely/not/installed"), "{body}");
    assert!(body.contains("Command exited with code: 127"));
    assert!(body.contains(r#"<div class="copyright">"#));
}

#[tokio::test]
async fn request_timeout_kills_long_command() {
    let app = app_with(RunSettings {
        request_timeout: Some(Duration::from_millis(300)),
        ..RunSettings::default()
    });
    let started = Instant::now();
    let body = body_text(get(app, "/sleeper").await).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(body.contains("Command exited with code: -1"), "{body}");
    assert!(body.ends_with("</html>\n"));
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let router = app();
    let (a, b) = tokio::join!(get(router.clone(), "/echo"), get(router, "/markup"));
    let (a, b) = tokio::join!(body_text(a), body_text(b));
    assert!(a.contains("fake command output") && !a.contains("&lt;b&gt;"));
    assert!(b.contains("&lt;b&gt;") && !b.contains("fake command output"));
}

// ---------------------------------------------------------------------------
// 3. Fake filesystem root
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fs_root_prefixes_command_paths() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
    std::os::unix::fs::symlink("/bin/echo", root.path().join("usr/bin/uptime")).unwrap();

    let settings = RunSettings {
        fs_root: Some(root.path().to_path_buf()),
        ..RunSettings::default()
    };
    let catalog = Catalog::new([CommandSpec::new("uptime", "/usr/bin/uptime", "fake command output")])
        .unwrap()
        .probe(settings.fs_root.as_deref());
    assert_eq!(catalog.existing().count(), 1);

    let app = build_app(Arc::new(AppState::new(catalog, settings)));
    let body = body_text(get(app, "/uptime").await).await;
    assert!(body.contains("<pre>fake command output"), "{body}");
    assert!(body.contains("Command exited with code: 0"));
}

// ---------------------------------------------------------------------------
// 4. Static assets, health, unknown paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_assets_are_served_with_content_type() {
    let resp = get(app(), "/static/style.css").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/css; charset=utf-8"
    );
    assert!(body_text(resp).await.contains(".copyright"));

    let resp = get(app(), "/static/favicon.svg").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/svg+xml");
}

#[tokio::test]
async fn unknown_static_asset_is_404() {
    let resp = get(app(), "/static/secrets.txt").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_catalog_counts() {
    let resp = get(app(), "/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["commands"], 6);
    assert_eq!(json["available"], 5);
    assert!(json["time"].is_string());
}

#[tokio::test]
async fn unknown_path_is_404() {
    let resp = get(app(), "/rm").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let resp = get(app(), "/health").await;
    let id = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}
