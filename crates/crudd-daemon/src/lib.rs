// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP front end for the CRUDD diagnostics dashboard.
//!
//! [`build_app`] turns a probed [`Catalog`] into an axum [`Router`]: an index
//! page, embedded static assets, a health probe, and one streaming page per
//! catalog entry. Each command request owns its subprocess; the process is
//! killed when the client goes away or the request deadline passes.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Embedded static assets.
pub mod assets;
/// Middleware stack for the dashboard HTTP server.
pub mod middleware;
/// Embedded HTML templates.
pub mod pages;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    middleware as axum_middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use crudd_catalog::{Catalog, CommandSpec, resolve_path};
use crudd_config::{ConfigError, DashboardConfig};
use crudd_exec::{CancelToken, ChannelSink, CommandRun, LaunchSpec};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::middleware::{RequestLogger, request_id_middleware};

/// Chunks buffered between a running command and its response body.
const BODY_CHANNEL_CAPACITY: usize = 64;

/// Per-request execution settings shared by every command route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Fake filesystem root prepended to executable paths.
    pub fs_root: Option<PathBuf>,
    /// Time a command gets to exit after drain or cancellation.
    pub grace_period: Duration,
    /// Hard deadline for one command request.
    pub request_timeout: Option<Duration>,
    /// Log every streamed line.
    pub verbose: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            fs_root: None,
            grace_period: Duration::from_secs(crudd_config::DEFAULT_GRACE_PERIOD_SECS),
            request_timeout: None,
            verbose: false,
        }
    }
}

impl RunSettings {
    /// Settings derived from an effective configuration.
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            fs_root: config.fs_root(),
            grace_period: config.grace_period(),
            request_timeout: config.request_timeout(),
            verbose: config.verbose(),
        }
    }
}

/// Shared application state for the dashboard HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Probed command catalog; fixed for the lifetime of the server.
    pub catalog: Arc<Catalog>,
    /// Execution settings.
    pub settings: RunSettings,
}

impl AppState {
    /// Wrap an already-probed catalog.
    pub fn new(catalog: Catalog, settings: RunSettings) -> Self {
        Self {
            catalog: Arc::new(catalog),
            settings,
        }
    }

    /// Build and probe the catalog described by `config`.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, ConfigError> {
        let settings = RunSettings::from_config(config);
        let catalog = config.catalog()?.probe(settings.fs_root.as_deref());
        info!(
            target: "crudd.catalog",
            commands = catalog.len(),
            available = catalog.existing().count(),
            "command catalog probed"
        );
        Ok(Self::new(catalog, settings))
    }
}

/// Build the axum router with every route and the middleware stack.
pub fn build_app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(cmd_index))
        .route("/health", get(cmd_health))
        .route("/static/{file}", get(assets::cmd_static));

    for command in state.catalog.commands() {
        let command = command.clone();
        let route = format!("/{}", command.name);
        router = router.route(
            &route,
            get(move |State(state): State<Arc<AppState>>| {
                let command = command.clone();
                async move { cmd_command(state, command) }
            }),
        );
    }

    router
        .fallback(cmd_not_found)
        .layer(axum_middleware::from_fn(RequestLogger::layer))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn cmd_index(State(state): State<Arc<AppState>>) -> Html<String> {
    match pages::index(&state.catalog) {
        Ok(page) => Html(page),
        Err(e) => {
            tracing::error!(target: "crudd.http", error = %e, "index page failed to render");
            Html(pages::template_failure(&e))
        }
    }
}

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "commands": state.catalog.len(),
        "available": state.catalog.existing().count(),
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}

/// Start `command` and return a response streaming its page.
fn cmd_command(state: Arc<AppState>, command: CommandSpec) -> Response {
    let settings = &state.settings;
    let program = resolve_path(settings.fs_root.as_deref(), &command.path);
    let spec = LaunchSpec::new(program)
        .args(command.argv())
        .grace_period(settings.grace_period);
    let run = CommandRun::new(spec)
        .header(rendered(pages::command_header(&command)))
        .footer(rendered(pages::command_footer()))
        .verbose(settings.verbose);

    let (sink, rx) = ChannelSink::new(BODY_CHANNEL_CAPACITY);
    tokio::spawn(stream_command(
        command.name,
        run,
        sink,
        settings.request_timeout,
    ));

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))),
    );
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}

fn rendered(fragment: Result<String, pages::TemplateError>) -> String {
    fragment.unwrap_or_else(|e| {
        tracing::error!(target: "crudd.http", error = %e, "page fragment failed to render");
        pages::template_failure(&e)
    })
}

/// Drive one run, cancelling it if the client leaves or the deadline passes.
///
/// The run is always awaited to completion so its process is reaped.
async fn stream_command(
    name: String,
    run: CommandRun,
    mut sink: ChannelSink,
    timeout: Option<Duration>,
) {
    let cancel = CancelToken::new();
    let disconnected = sink.disconnected();
    let execution = run.execute(&mut sink, cancel.clone());
    tokio::pin!(execution);

    let report = tokio::select! {
        report = &mut execution => report,
        reason = request_cancelled(disconnected, timeout) => {
            info!(target: "crudd.http", command = %name, reason, "request cancelled");
            cancel.cancel();
            execution.await
        }
    };
    debug!(
        target: "crudd.http",
        command = %name,
        exit_code = report.exit_code,
        lines = report.lines,
        cancelled = report.cancelled,
        "command response finished"
    );
}

async fn request_cancelled(
    disconnected: impl Future<Output = ()>,
    timeout: Option<Duration>,
) -> &'static str {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = disconnected => "client disconnected",
        _ = deadline => "request deadline exceeded",
    }
}
