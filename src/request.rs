//! Incoming HTTP request type.
//!
//! The receipt data (method, path, headers, body, arrival time) is frozen the
//! moment the request is built. What changes as the request travels inward is
//! routing metadata: the router records bound `{name}` parameters and how much
//! of the path STARTS_WITH rules have consumed, and stages may attach typed
//! extensions.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};

/// An incoming HTTP request.
///
/// Cloning is cheap: the receipt data sits behind an `Arc`, the body is
/// reference-counted [`Bytes`].
#[derive(Clone, Debug)]
pub struct Request {
    head: Arc<Head>,
    body: Bytes,
    params: HashMap<String, String>,
    consumed: usize,
    extensions: Extensions,
}

#[derive(Debug)]
struct Head {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    received_at: DateTime<Utc>,
}

impl Request {
    /// Starts building a request. Mostly useful in tests and when embedding
    /// trellis behind a transport other than [`Server`](crate::Server).
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: "/".to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            received_at: None,
        }
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let path = parts.uri.path().to_owned();
        let query = parts.uri.query().map(ToOwned::to_owned);
        Self::new(parts.method, path, query, parts.headers, body, Utc::now())
    }

    fn new(
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            head: Arc::new(Head { method, path, query, headers, received_at }),
            body,
            params: HashMap::new(),
            consumed: 0,
            extensions: Extensions::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn path(&self) -> &str { &self.head.path }
    pub fn query(&self) -> Option<&str> { self.head.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// When the request was received. Expiration times are computed from this
    /// instant, not from the moment a stage happens to run.
    pub fn received_at(&self) -> DateTime<Utc> { self.head.received_at }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// The part of the path not yet consumed by STARTS_WITH rules.
    ///
    /// A request for `/static/css/app.css` that matched the prefix `/static`
    /// sees `/css/app.css` here. An exhausted path reads as `/`.
    pub fn remaining(&self) -> &str {
        match self.head.path.get(self.consumed..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => "/",
        }
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }

    /// Typed extensions are the only mutable part of a request. Stages use
    /// them to hand context objects to handlers.
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Shortcut for `extensions().get::<T>()`.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub(crate) fn consumed(&self) -> usize { self.consumed }

    pub(crate) fn set_route(&mut self, consumed: usize, params: HashMap<String, String>) {
        self.consumed = consumed;
        self.params.extend(params);
    }
}

/// Builder for [`Request`]. Obtain via [`Request::builder()`].
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    received_at: Option<DateTime<Utc>>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path with an optional `?query`.
    pub fn uri(mut self, uri: &str) -> Self {
        uri.clone_into(&mut self.uri);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Pins the receipt time. Defaults to now.
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    pub fn build(self) -> Request {
        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (self.uri, None),
        };
        Request::new(
            self.method,
            path,
            query,
            self.headers,
            self.body,
            self.received_at.unwrap_or_else(Utc::now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn splits_query_from_path() {
        let req = Request::builder().uri("/search?q=rust").build();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder()
            .header(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"))
            .build();
        assert_eq!(req.header("Accept-Encoding"), Some("gzip"));
        assert_eq!(req.header("ACCEPT-ENCODING"), Some("gzip"));
    }

    #[test]
    fn remaining_tracks_consumed_prefix() {
        let mut req = Request::builder().uri("/static/app.css").build();
        assert_eq!(req.remaining(), "/static/app.css");

        req.set_route("/static".len(), HashMap::new());
        assert_eq!(req.remaining(), "/app.css");

        req.set_route("/static/app.css".len(), HashMap::new());
        assert_eq!(req.remaining(), "/");
    }

    #[test]
    fn clones_share_receipt_data() {
        let mut req = Request::builder().uri("/a").build();
        let copy = req.clone();
        req.extensions_mut().insert(7_u32);
        assert_eq!(copy.path(), "/a");
        assert!(copy.extension::<u32>().is_none());
        assert_eq!(req.extension::<u32>(), Some(&7));
    }
}
