//! Response bodies answered on webhook routes
//!
//! Every route answers with a small JSON document:
//!
//! ```json
//! {"msg": "success"}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Body of every webhook route response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub msg: String,
}

/// Respond with an arbitrary status code
pub fn respond(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(MessageResponse { msg: msg.into() })).into_response()
}

/// `200 OK`: the request was accepted
pub fn success(msg: impl Into<String>) -> Response {
    respond(StatusCode::OK, msg)
}

/// `400 Bad Request`: the route is inactive or the request could not be decoded
pub fn bad_request(msg: impl Into<String>) -> Response {
    respond(StatusCode::BAD_REQUEST, msg)
}

/// `404 Not Found`: no route is registered for the path
pub fn not_found(msg: impl Into<String>) -> Response {
    respond(StatusCode::NOT_FOUND, msg)
}

/// `405 Method Not Allowed`: the route only accepts another method
pub fn method_not_allowed(msg: impl Into<String>) -> Response {
    respond(StatusCode::METHOD_NOT_ALLOWED, msg)
}

/// `500 Internal Server Error`: unexpected failure in adapter code
pub fn internal_error(msg: impl Into<String>) -> Response {
    respond(StatusCode::INTERNAL_SERVER_ERROR, msg)
}
