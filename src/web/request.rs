//! Request extraction with controller injection.
//!
//! # Responsibilities
//! - Hand every handler a fresh controller from the application factory
//! - Resolve the caller IP and host behind reverse proxies
//! - Flatten headers and arguments (form body + query)
//! - Deserialize arguments or the body into typed packets
//!
//! # Design Decisions
//! - The body is buffered once; `DefaultBodyLimit` bounds it
//! - Flattened views are computed lazily and cached
//! - Deserialization failures are 400s with the reason, never 500s

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::flat::{FlatMap, FlatValue};
use crate::web::application::WebContext;
use crate::web::error::WebError;

/// Standard header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request extractor for routes served by a `WebApplication<C>`.
pub struct WebRequest<C> {
    controller: C,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Bytes,
    flat_headers: OnceLock<FlatMap>,
    flat_args: OnceLock<FlatMap>,
}

impl<C> FromRequest<WebContext<C>> for WebRequest<C>
where
    C: Send + Sync + 'static,
{
    type Rejection = WebError;

    async fn from_request(req: Request, state: &WebContext<C>) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = req.headers().clone();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let body = Bytes::from_request(req, state).await?;

        Ok(Self {
            controller: state.make_controller(),
            method,
            uri,
            headers,
            peer,
            body,
            flat_headers: OnceLock::new(),
            flat_args: OnceLock::new(),
        })
    }
}

impl<C> WebRequest<C> {
    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request ID assigned by the service, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// The actual hostname: `X-Forwarded-For`, else `Host`.
    pub fn address(&self) -> Option<&str> {
        self.header("x-forwarded-for").or_else(|| self.header(HOST.as_str()))
    }

    /// The real caller IP: `X-Real-IP`, else the socket peer.
    pub fn remote(&self) -> Option<String> {
        self.header("x-real-ip")
            .map(str::to_string)
            .or_else(|| self.peer.map(|addr| addr.ip().to_string()))
    }

    /// Headers with repeated names collapsed into lists.
    pub fn flat_headers(&self) -> &FlatMap {
        self.flat_headers.get_or_init(|| FlatMap::from_headers(&self.headers))
    }

    /// Form body arguments followed by query arguments, flattened.
    pub fn flat_args(&self) -> &FlatMap {
        self.flat_args.get_or_init(|| {
            let form: Vec<(String, String)> = if self.is_form() {
                url::form_urlencoded::parse(&self.body).into_owned().collect()
            } else {
                Vec::new()
            };
            let query = url::form_urlencoded::parse(self.uri.query().unwrap_or("").as_bytes())
                .into_owned();
            FlatMap::from_pairs(form.into_iter().chain(query))
        })
    }

    /// Body text, `None` when the request has no body.
    pub fn body(&self) -> Option<String> {
        if self.body.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.body).into_owned())
        }
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Path plus every argument rendered as a query string.
    pub fn uri(&self) -> String {
        let args = self.flat_args();
        if args.is_empty() {
            return self.path().to_string();
        }
        let params: Vec<String> = args
            .iter()
            .flat_map(|(key, value)| {
                value
                    .all()
                    .into_iter()
                    .map(move |v| format!("{key}={v}"))
            })
            .collect();
        format!("{}?{}", self.path(), params.join("&"))
    }

    /// Pull the named arguments in order.
    ///
    /// `names` are required; `defaults` are optional with a fallback value.
    /// A required argument that is missing is a 400.
    pub fn extract_args(
        &self,
        names: &[&str],
        defaults: &[(&str, &str)],
    ) -> Result<Vec<FlatValue>, WebError> {
        let args = self.flat_args();
        let mut values = Vec::with_capacity(names.len() + defaults.len());

        for name in names {
            let value = args
                .get(name)
                .cloned()
                .or_else(|| {
                    defaults
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| FlatValue::Single(v.to_string()))
                })
                .ok_or_else(|| WebError::bad_request(format!("Missing argument {name}")))?;
            values.push(value);
        }
        for (name, default) in defaults.iter().filter(|(k, _)| !names.contains(k)) {
            let value = args
                .get(name)
                .cloned()
                .unwrap_or_else(|| FlatValue::Single(default.to_string()));
            values.push(value);
        }

        Ok(values)
    }

    /// `(scheme, token)` from the `Authorization` header.
    pub fn auth(&self) -> Option<(&str, &str)> {
        let value = self.header(AUTHORIZATION.as_str())?.trim();
        let (scheme, token) = value.split_once(char::is_whitespace)?;
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some((scheme, token))
        }
    }

    /// Deserialize the JSON body into a packet.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, WebError> {
        let value: serde_json::Value = serde_json::from_slice(&self.body)
            .map_err(|e| WebError::bad_request(format!("Error json deserializing \"{e}\"")))?;
        load_packet(value)
    }

    /// Deserialize one argument holding a JSON document.
    pub fn json_arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, WebError> {
        let values = self.extract_args(&[name], &[])?;
        let raw = values.first().map(FlatValue::first).unwrap_or("");
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| WebError::bad_request(format!("Error json deserializing \"{e}\"")))?;
        load_packet(value)
    }

    /// Deserialize all flattened arguments as one object.
    pub fn args_as<T: DeserializeOwned>(&self) -> Result<T, WebError> {
        load_packet(self.flat_args().to_json())
    }

    pub fn into_controller(self) -> C {
        self.controller
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn is_form(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .map(|ct| ct.trim_start().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }
}

fn load_packet<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, WebError> {
    serde_json::from_value(value).map_err(|e| {
        let reason = e.to_string().replace('"', "'");
        WebError::bad_request(format!("Error in arguments \"{reason}\""))
    })
}

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        i: bool,
        r: String,
        resp: u32,
    }

    async fn extract(request: axum::http::Request<Body>) -> WebRequest<u32> {
        let context = WebContext::new(|| 10u32);
        WebRequest::from_request(request, &context).await.unwrap()
    }

    #[tokio::test]
    async fn controller_and_remote() {
        let mut request = axum::http::Request::builder()
            .uri("/health")
            .header("host", "example.org")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 5], 4000))));

        let req = extract(request).await;
        assert_eq!(*req.controller(), 10);
        assert_eq!(req.remote().as_deref(), Some("10.0.0.5"));
        assert_eq!(req.address(), Some("example.org"));
        assert_eq!(req.body(), None);
        assert_eq!(req.uri(), "/health");
    }

    #[tokio::test]
    async fn proxy_headers_win() {
        let request = axum::http::Request::builder()
            .uri("/")
            .header("host", "internal")
            .header("x-real-ip", "203.0.113.9")
            .header("x-forwarded-for", "public.example")
            .body(Body::empty())
            .unwrap();

        let req = extract(request).await;
        assert_eq!(req.remote().as_deref(), Some("203.0.113.9"));
        assert_eq!(req.address(), Some("public.example"));
    }

    #[tokio::test]
    async fn form_and_query_args_are_flattened() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/items?page=2&tag=b")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("tag=a&name=x"))
            .unwrap();

        let req = extract(request).await;
        let args = req.flat_args();
        assert_eq!(args.get("tag"), Some(&FlatValue::Multiple(vec!["a".into(), "b".into()])));
        assert_eq!(args.first("name"), Some("x"));
        assert_eq!(req.uri(), "/items?tag=a&tag=b&name=x&page=2");

        let values = req.extract_args(&["name"], &[("limit", "10"), ("page", "1")]).unwrap();
        assert_eq!(
            values,
            vec![
                FlatValue::Single("x".into()),
                FlatValue::Single("10".into()),
                FlatValue::Single("2".into()),
            ]
        );

        let err = req.extract_args(&["missing"], &[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing argument missing");
    }

    #[tokio::test]
    async fn json_body_packets() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/packet")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"i": true, "r": "Are you ok?", "resp": 8}"#))
            .unwrap();
        let req = extract(request).await;
        let probe: Probe = req.json_body().unwrap();
        assert_eq!(probe, Probe { i: true, r: "Are you ok?".into(), resp: 8 });
        // Not a form body
        assert!(req.flat_args().is_empty());

        let broken = axum::http::Request::builder()
            .method("POST")
            .uri("/packet")
            .body(Body::from("{not json"))
            .unwrap();
        let err = extract(broken).await.json_body::<Probe>().unwrap_err();
        assert!(err.to_string().starts_with("Error json deserializing"));

        let wrong_shape = axum::http::Request::builder()
            .method("POST")
            .uri("/packet")
            .body(Body::from(r#"{"i": true}"#))
            .unwrap();
        let err = extract(wrong_shape).await.json_body::<Probe>().unwrap_err();
        assert!(err.to_string().starts_with("Error in arguments"));
    }

    #[tokio::test]
    async fn auth_header_split() {
        let request = axum::http::Request::builder()
            .uri("/")
            .header("authorization", "Bearer  abc.def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract(request).await.auth(), Some(("Bearer", "abc.def")));

        let request = axum::http::Request::builder()
            .uri("/")
            .header("authorization", "Bearer")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract(request).await.auth(), None);
    }
}
