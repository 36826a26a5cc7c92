use axum::http::StatusCode;
use axum::Json;
use ledger_core::Error;
use serde_json::{json, Value};

/// Maps the shared error taxonomy onto HTTP status + `{error: CODE}` body
/// (spec §7: "User-visible responses always include an error code symbol").
pub fn to_response(err: &Error) -> (StatusCode, Json<Value>) {
    let status = match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) => StatusCode::CONFLICT,
        Error::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Throttled(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::BudgetExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::QueueHalted => StatusCode::SERVICE_UNAVAILABLE,
        Error::JobCancelled => StatusCode::CONFLICT,
        Error::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.code(), "message": err.to_string() })))
}
