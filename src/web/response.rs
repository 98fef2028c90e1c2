//! Response helpers.
//!
//! # Responsibilities
//! - Build a response from text, JSON values or serializable packets
//! - Pick the MIME type from the kind of data
//!
//! # Design Decisions
//! - Text replies are `text/plain; charset=utf-8`
//! - Everything structured is serialized once and sent as `application/json`

use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Data a handler replies with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Json(serde_json::Value),
}

impl Reply {
    /// Serialize a packet (any `Serialize` type) as a JSON reply.
    pub fn packet<T: Serialize + ?Sized>(packet: &T) -> serde_json::Result<Self> {
        serde_json::to_value(packet).map(Reply::Json)
    }

    fn into_json(self) -> serde_json::Value {
        match self {
            Reply::Text(text) => serde_json::Value::String(text),
            Reply::Json(value) => value,
        }
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<serde_json::Value> for Reply {
    fn from(value: serde_json::Value) -> Self {
        Reply::Json(value)
    }
}

/// A list of replies becomes one JSON array.
impl From<Vec<Reply>> for Reply {
    fn from(items: Vec<Reply>) -> Self {
        Reply::Json(serde_json::Value::Array(
            items.into_iter().map(Reply::into_json).collect(),
        ))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        make_response(self, StatusCode::OK, None)
    }
}

/// Create a response with the MIME type set from the kind of data.
pub fn make_response(
    source: impl Into<Reply>,
    status: StatusCode,
    headers: Option<HeaderMap>,
) -> Response {
    let (body, content_type) = match source.into() {
        Reply::Text(text) => (text, TEXT_PLAIN),
        Reply::Json(value) => (value.to_string(), APPLICATION_JSON),
    };

    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(headers) = headers {
        response.headers_mut().extend(headers);
    }
    response
}
