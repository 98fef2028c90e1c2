//! Per-request options passed alongside a verb call.

use serde::Serialize;

use crate::client::error::{ClientError, ClientResult};

/// Request body payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(serde_json::Value),
    /// Sent verbatim with `Content-Type: text/plain; charset=utf-8`.
    Text(String),
    /// Urlencoded form fields.
    Form(Vec<(String, String)>),
}

/// Optional headers, query parameters and body for a single request.
///
/// ```
/// use asyncweb::client::RequestOptions;
///
/// let options = RequestOptions::new()
///     .header("x-trace", "abc")
///     .query("page", "2")
///     .text("hello");
/// assert_eq!(options.headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request header. Repeated names are sent as repeated headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter to the URL.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Use an already-built JSON value as the body.
    pub fn json_value(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(value).map_err(ClientError::Encode)?;
        Ok(self.json_value(value))
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }
}
