//! Feed handlers: posts, comments, and search.
//!
//! Creating a post (directly or through search) hands it to the dispatcher
//! for persona comments; the response never waits for generation.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ofsocial_dispatcher::DispatcherError;
use ofsocial_state::{PostId, StateError};

use crate::ApiState;
use crate::response::{ApiResponse, error_response};

/// Body of `POST /api/posts` and `POST /api/posts/{id}/comments`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContentRequest {
    pub content: String,
    pub author: Option<String>,
}

impl ContentRequest {
    fn author_or(&self, default: &str) -> String {
        match self.author.as_deref().map(str::trim) {
            Some(author) if !author.is_empty() => author.to_string(),
            _ => default.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedPost {
    pub post_id: PostId,
    pub comments_scheduled: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
}

// ── Posts ──────────────────────────────────────────────────────

/// GET /api/posts
pub async fn list_posts(State(state): State<ApiState>) -> Response {
    match state.store.list_posts() {
        Ok(posts) => ApiResponse::ok(posts).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/posts
pub async fn create_post(
    State(state): State<ApiState>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let content = req.content.trim();
    if content.is_empty() {
        return error_response("empty content", StatusCode::BAD_REQUEST);
    }
    let author = req.author_or("Anonymous");

    let post_id = match state.store.add_post(content, &author, false) {
        Ok(id) => id,
        Err(e) => return internal_error(e),
    };
    info!(post_id, %author, "post created");

    let comments_scheduled = match state.dispatcher.submit_post_comments(post_id, content).await {
        Ok(handles) => handles.len(),
        Err(e) => {
            // The post is stored either way; it just gets no persona comments.
            warn!(post_id, error = %e, "comment fan-out not scheduled");
            0
        }
    };

    ApiResponse::ok(CreatedPost {
        post_id,
        comments_scheduled,
    })
    .into_response()
}

// ── Comments ───────────────────────────────────────────────────

/// GET /api/posts/{id}/comments
pub async fn list_comments(State(state): State<ApiState>, Path(post_id): Path<PostId>) -> Response {
    match state.store.list_comments(post_id) {
        Ok(comments) => ApiResponse::ok(comments).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/posts/{id}/comments
pub async fn add_comment(
    State(state): State<ApiState>,
    Path(post_id): Path<PostId>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let content = req.content.trim();
    if content.is_empty() {
        return error_response("empty comment", StatusCode::BAD_REQUEST);
    }
    let author = req.author_or("You");

    match state.store.add_comment(post_id, content, &author) {
        Ok(comment_id) => ApiResponse::ok(serde_json::json!({ "comment_id": comment_id })).into_response(),
        Err(StateError::PostNotFound(_)) => error_response("post not found", StatusCode::NOT_FOUND),
        Err(e) => internal_error(e),
    }
}

// ── Search ─────────────────────────────────────────────────────

/// GET /api/search?q=
pub async fn search(State(state): State<ApiState>, Query(query): Query<SearchQuery>) -> Response {
    let q = query.q.trim();
    if q.is_empty() {
        return error_response("empty query", StatusCode::BAD_REQUEST);
    }

    match state.dispatcher.publish_search_posts(q).await {
        Ok(posts) => ApiResponse::ok(posts).into_response(),
        Err(DispatcherError::ShuttingDown) => {
            error_response("server is shutting down", StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(e) => {
            warn!(query = q, error = %e, "search generation failed");
            internal_error(e)
        }
    }
}
