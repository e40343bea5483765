//! Persona administration behind HTTP Basic auth.

use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{info, warn};

use ofsocial_core::Persona;
use ofsocial_core::config::AdminConfig;
use ofsocial_state::StateError;

use crate::ApiState;
use crate::assets;
use crate::response::{ApiResponse, error_response};

const REALM: &str = "Basic realm=\"ofsocial admin\"";

/// Decode an `Authorization: Basic ...` header value into `(user, password)`.
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn authorized(admin: &AdminConfig, request: &Request) -> bool {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_auth)
        .is_some_and(|(user, password)| admin.verify(&user, &password))
}

/// Middleware rejecting requests without valid admin credentials.
pub async fn require_admin(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if authorized(&state.admin, &request) {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "admin authentication failed");
    let mut response = error_response("authentication required", StatusCode::UNAUTHORIZED);
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static(REALM));
    response
}

/// Body of persona create/update requests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PersonaRequest {
    pub name: String,
    pub style: String,
}

impl PersonaRequest {
    fn into_persona(self) -> Option<Persona> {
        let name = self.name.trim();
        let style = self.style.trim();
        if name.is_empty() || style.is_empty() {
            return None;
        }
        Some(Persona::new(name, style))
    }
}

/// GET /admin
pub async fn admin_page(State(state): State<ApiState>) -> Response {
    assets::serve_file(&state.static_dir, "admin.html").await
}

/// GET /admin/personas
pub async fn list_personas(State(state): State<ApiState>) -> Response {
    match state.store.list_personas() {
        Ok(personas) => ApiResponse::ok(personas).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /admin/personas
pub async fn add_persona(
    State(state): State<ApiState>,
    Json(req): Json<PersonaRequest>,
) -> Response {
    let Some(persona) = req.into_persona() else {
        return error_response("name and style required", StatusCode::BAD_REQUEST);
    };
    match state.store.add_persona(&persona) {
        Ok(()) => {
            info!(persona = %persona.name, "persona added");
            (StatusCode::CREATED, ApiResponse::ok(persona)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// PUT /admin/personas/{index}
pub async fn update_persona(
    State(state): State<ApiState>,
    Path(index): Path<usize>,
    Json(req): Json<PersonaRequest>,
) -> Response {
    let Some(persona) = req.into_persona() else {
        return error_response("name and style required", StatusCode::BAD_REQUEST);
    };
    match state.store.update_persona(index, &persona) {
        Ok(()) => {
            info!(index, persona = %persona.name, "persona updated");
            ApiResponse::ok(persona).into_response()
        }
        Err(StateError::PersonaNotFound(_)) => error_response("invalid index", StatusCode::NOT_FOUND),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// DELETE /admin/personas/{index}
pub async fn delete_persona(State(state): State<ApiState>, Path(index): Path<usize>) -> Response {
    match state.store.delete_persona(index) {
        Ok(persona) => {
            info!(index, persona = %persona.name, "persona deleted");
            ApiResponse::ok(persona).into_response()
        }
        Err(StateError::PersonaNotFound(_)) => error_response("invalid index", StatusCode::NOT_FOUND),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}
