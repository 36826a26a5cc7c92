use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;

use crate::state::AppState;

/// `GET /metrics` (spec §6). When `METRICS_AUTH_USER`/`METRICS_AUTH_PASS` are
/// set, gates the Prometheus text exposition behind HTTP Basic auth; a
/// missing/incorrect `Authorization` header yields 401 with
/// `WWW-Authenticate: Basic`. Method/path routing (405 for non-GET/HEAD, 404
/// for anything else) is handled by the router itself.
pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some((expected_user, expected_pass)) = &state.settings.metrics_auth {
        match headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(header) if credentials_match(header, expected_user, expected_pass) => {}
            _ => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [("WWW-Authenticate", "Basic realm=\"metrics\"")],
                    "unauthorized",
                )
                    .into_response()
            }
        }
    }

    state.prometheus_handle.render().into_response()
}

fn credentials_match(header: &str, expected_user: &str, expected_pass: &str) -> bool {
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };
    user == expected_user && pass == expected_pass
}
