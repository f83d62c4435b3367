//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Cache validators (`Expires`, `Last-Modified`, `ETag`), cache directives and
//! the content encoding are kept as typed fields rather than raw headers so
//! that stages can inspect and rewrite them without re-parsing strings. They
//! are rendered into real headers once, in [`Response::into_http`].

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

use crate::error::Error;
use crate::middleware::compression::Encoding;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Css,          // text/css
    Html,         // text/html; charset=utf-8
    JavaScript,   // application/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Html        => "text/html; charset=utf-8",
            Self::JavaScript  => "application/javascript",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A deferred body producer, run once when the response is rendered.
pub type Producer = Box<dyn FnOnce() -> Result<Bytes, Error> + Send + 'static>;

/// Response body: nothing, bytes in hand, or bytes produced on demand.
pub enum Body {
    Empty,
    Full(Bytes),
    Lazy(Producer),
}

impl Body {
    pub fn lazy(producer: impl FnOnce() -> Result<Bytes, Error> + Send + 'static) -> Self {
        Self::Lazy(Box::new(producer))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Lazy(_) => false,
        }
    }

    /// Length when known without running a producer.
    pub fn len_hint(&self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Full(bytes) => Some(bytes.len()),
            Self::Lazy(_) => None,
        }
    }

    /// Resolves the body to bytes, running a lazy producer if there is one.
    pub fn into_bytes(self) -> Result<Bytes, Error> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Lazy(produce) => produce(),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Self::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self { Self::Full(bytes) }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self { Self::Full(bytes.into()) }
}

// ── Cache directives ──────────────────────────────────────────────────────────

/// A `Cache-Control` directive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheDirective {
    NoCache,
    NoStore,
    Public,
    Private,
    MaxAge(u64),
}

impl fmt::Display for CacheDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCache => f.write_str("no-cache"),
            Self::NoStore => f.write_str("no-store"),
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
            Self::MaxAge(secs) => write!(f, "max-age={secs}"),
        }
    }
}

/// Formats a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use trellis::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use trellis::{ContentType, Response};
/// use http::{header, HeaderValue, StatusCode};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(header::LOCATION, HeaderValue::from_static("/users/42"))
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder().bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    directives: Vec<CacheDirective>,
    expires: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
    etag: Option<String>,
    encoding: Option<Encoding>,
    logical_len: Option<usize>,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().finish("application/json", body.into())
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    fn with_body(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            logical_len: body.len_hint(),
            status,
            headers,
            body,
            directives: Vec::new(),
            expires: None,
            last_modified: None,
            etag: None,
            encoding: None,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, status: StatusCode) { self.status = status; }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Case-insensitive lookup of a raw header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Body { &self.body }

    /// A response "has a body" unless it is empty. Lazy bodies count.
    pub fn has_body(&self) -> bool { !self.body.is_empty() }

    /// Replaces the body. The logical length follows the new body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
        self.logical_len = self.body.len_hint();
    }

    /// Swaps in a transformed body while keeping the logical length of the
    /// original. Used by encoders.
    pub(crate) fn try_map_body(
        &mut self,
        f: impl FnOnce(Body) -> Result<Body, Error>,
    ) -> Result<(), Error> {
        let body = std::mem::replace(&mut self.body, Body::Empty);
        self.body = f(body)?;
        Ok(())
    }

    /// Body length before any content encoding was applied, when known.
    pub fn logical_len(&self) -> Option<usize> { self.logical_len }

    pub fn cache_directives(&self) -> &[CacheDirective] { &self.directives }

    /// Adds a directive; directives behave as a set. A new `max-age` replaces
    /// the old one.
    pub fn add_directive(&mut self, directive: CacheDirective) {
        if let CacheDirective::MaxAge(_) = directive {
            self.directives.retain(|d| !matches!(d, CacheDirective::MaxAge(_)));
        }
        if !self.directives.contains(&directive) {
            self.directives.push(directive);
        }
    }

    pub fn remove_directive(&mut self, directive: CacheDirective) {
        self.directives.retain(|d| match (d, directive) {
            (CacheDirective::MaxAge(_), CacheDirective::MaxAge(_)) => false,
            (a, b) => *a != b,
        });
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> { self.expires }
    pub fn set_expires(&mut self, at: Option<DateTime<Utc>>) {
        self.expires = at;
        if at.is_none() {
            self.headers.remove(header::EXPIRES);
        }
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> { self.last_modified }
    pub fn set_last_modified(&mut self, at: Option<DateTime<Utc>>) {
        self.last_modified = at;
        if at.is_none() {
            self.headers.remove(header::LAST_MODIFIED);
        }
    }

    pub fn etag(&self) -> Option<&str> { self.etag.as_deref() }
    pub fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
        if self.etag.is_none() {
            self.headers.remove(header::ETAG);
        }
    }

    pub fn encoding(&self) -> Option<Encoding> { self.encoding }

    pub(crate) fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = Some(encoding);
    }

    /// Renders typed fields into headers and resolves the body.
    ///
    /// Fails only when a lazy body producer fails.
    pub fn into_http(self) -> Result<http::Response<Full<Bytes>>, Error> {
        let Self {
            status,
            mut headers,
            body,
            directives,
            expires,
            last_modified,
            etag,
            encoding,
            ..
        } = self;

        if !directives.is_empty() {
            let value = directives.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            insert_str(&mut headers, header::CACHE_CONTROL, &value);
        }
        if let Some(at) = expires {
            insert_str(&mut headers, header::EXPIRES, &http_date(at));
        }
        if let Some(at) = last_modified {
            insert_str(&mut headers, header::LAST_MODIFIED, &http_date(at));
        }
        if let Some(tag) = etag {
            insert_str(&mut headers, header::ETAG, &tag);
        }
        if let Some(encoding) = encoding {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
            // hyper recomputes the length from the encoded body.
            headers.remove(header::CONTENT_LENGTH);
        }

        let mut res = http::Response::new(Full::new(body.into_bytes()?));
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        Ok(res)
    }
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => { headers.insert(name, v); }
        Err(_) => tracing::warn!(header = %name, "dropping header with invalid value"),
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so you always know what you're sending.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes().into())
    }

    /// Terminate with a typed body. Use this for CSS, HTML, XML, binary, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Body>) -> Response {
        self.finish(content_type.as_str(), body.into())
    }

    /// Terminate with a body whose content type was detected elsewhere, such
    /// as from a file extension.
    pub fn typed(self, content_type: &'static str, body: impl Into<Body>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body (e.g. `204 No Content`, `304 Not Modified`).
    pub fn no_body(self) -> Response {
        Response::with_body(self.status, self.headers, Body::Empty)
    }

    fn finish(mut self, content_type: &'static str, body: Body) -> Response {
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type));
        Response::with_body(self.status, self.headers, body)
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
