//! Response normalization.
//!
//! # Responsibilities
//! - Turn a transport-level `RawResponse` into an immutable `ClientResponse`
//! - Decode the body as JSON only when the response says it is JSON
//! - Flatten repeated headers
//!
//! # Design Decisions
//! - A non-JSON content type leaves `json` empty instead of failing
//! - A JSON content type with a blank body also leaves `json` empty
//! - A JSON content type with a malformed body is a decode error

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::client::error::ClientResult;
use crate::flat::{FlatMap, FlatValue};

/// A completed response as handed back by a `Pool`.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Web client response for easy use.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: u16,
    method: String,
    text: String,
    json: Option<serde_json::Value>,
    headers: FlatMap,
}

impl ClientResponse {
    /// Build the caller-facing response from a raw one.
    pub fn from_raw(raw: RawResponse) -> ClientResult<Self> {
        let json = if is_json_content_type(&raw.headers) && !is_blank(&raw.body) {
            Some(serde_json::from_slice(&raw.body)?)
        } else {
            None
        };

        Ok(Self {
            status: raw.status,
            method: raw.method.as_str().to_string(),
            text: String::from_utf8_lossy(&raw.body).into_owned(),
            json,
            headers: FlatMap::from_headers(&raw.headers),
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decoded body, present only for JSON responses.
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Deserialize the decoded JSON body into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.json.clone().map(serde_json::from_value)
    }

    /// All headers, keyed by lowercase name.
    pub fn headers(&self) -> &FlatMap {
        &self.headers
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(&name.to_ascii_lowercase())
    }

    /// Every value of a header, case-insensitive.
    pub fn header_values(&self, name: &str) -> Option<&FlatValue> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Return true for `application/json` and `application/*+json` media types.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn raw(content_type: Option<&'static str>, body: &'static str) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        RawResponse {
            status: 200,
            method: Method::GET,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        assert!(is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json_content_type(&headers));
    }

    #[test]
    fn text_response_has_no_json() {
        let response = ClientResponse::from_raw(raw(Some("text/plain"), "{\"a\": 1}")).unwrap();
        assert_eq!(response.text(), "{\"a\": 1}");
        assert!(response.json().is_none());
        assert_eq!(response.method(), "GET");
    }

    #[test]
    fn json_response_is_decoded() {
        let response = ClientResponse::from_raw(raw(Some("application/json"), "{\"a\": 1}")).unwrap();
        assert_eq!(response.json(), Some(&serde_json::json!({"a": 1})));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn blank_json_body_is_absent() {
        let response = ClientResponse::from_raw(raw(Some("application/json"), "  ")).unwrap();
        assert!(response.json().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = ClientResponse::from_raw(raw(Some("application/json"), "{oops")).unwrap_err();
        assert!(matches!(err, crate::client::ClientError::Decode(_)));
    }
}
