//! Static pages and files served from the configured static directory.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::ApiState;
use crate::response::error_response;

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Resolve `relative` under `root`, refusing anything that could escape it.
fn resolve(root: &FsPath, relative: &str) -> Option<PathBuf> {
    let relative = FsPath::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Serve one file from `root`; 404 if it is missing or the path is unsafe.
pub async fn serve_file(root: &FsPath, relative: &str) -> Response {
    let Some(path) = resolve(root, relative) else {
        return error_response("not found", StatusCode::NOT_FOUND);
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "static file unavailable");
            error_response("not found", StatusCode::NOT_FOUND)
        }
    }
}

/// GET /
pub async fn index(State(state): State<ApiState>) -> Response {
    serve_file(&state.static_dir, "index.html").await
}

/// GET /static/{*path}
pub async fn static_file(State(state): State<ApiState>, Path(path): Path<String>) -> Response {
    serve_file(&state.static_dir, &path).await
}
