//! Caching policy for static content.
//!
//! Runs as a post hook only: it inspects the entity the content stage
//! produced, so running it before that stage would see nothing.
//!
//! - Paths with a `nocache` segment lose every validator (`Last-Modified`,
//!   `Expires`, `ETag`) and get `Cache-Control: no-cache`.
//! - Everything else is marked `200 OK`, expires one TTL after the request
//!   arrived, and drops `Last-Modified`.
//!
//! A `304 Not Modified` gets the same headers but keeps its status. Other
//! responses without a body pass through untouched.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, TimeDelta, Utc};
use http::StatusCode;
use tracing::trace;

use crate::config::CacheConfig;
use crate::error::Error;
use crate::pipeline::Stage;
use crate::request::Request;
use crate::response::{CacheDirective, Response};

/// The caching decision for one request. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub no_cache: bool,
    pub expiration: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl CachePolicy {
    /// Inspects the request path and decides.
    ///
    /// `etag` is always `None` here: the opt-out branch strips validators and
    /// the cacheable branch keeps whatever the content stage produced.
    pub fn derive(req: &Request, config: &CacheConfig) -> Self {
        if has_segment(req.path(), &config.nocache_segment) {
            return Self { no_cache: true, expiration: None, etag: None };
        }
        Self {
            no_cache: false,
            expiration: req.received_at().checked_add_signed(ttl(config.ttl_secs)),
            etag: None,
        }
    }

    /// Writes the decision onto a response. Only a response with a body is
    /// promoted to `200 OK`.
    pub fn apply(&self, res: &mut Response, ttl_secs: u64) {
        if self.no_cache {
            res.set_last_modified(None);
            res.set_expires(None);
            res.set_etag(None);
            res.remove_directive(CacheDirective::MaxAge(0));
            res.add_directive(CacheDirective::NoCache);
        } else {
            if res.has_body() {
                res.set_status(StatusCode::OK);
            }
            res.set_expires(self.expiration);
            res.set_last_modified(None);
            res.remove_directive(CacheDirective::NoCache);
            res.add_directive(CacheDirective::MaxAge(ttl_secs));
        }
    }
}

/// Post-hook stage applying [`CachePolicy`] to static-content responses.
pub struct CachePolicyFilter {
    config: CacheConfig,
}

impl CachePolicyFilter {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }
}

impl Default for CachePolicyFilter {
    fn default() -> Self { Self::new(CacheConfig::default()) }
}

impl Stage for CachePolicyFilter {
    fn name(&self) -> &'static str { "cache-policy" }

    fn after(&self, req: &Request, res: &mut Response) -> Result<(), Error> {
        if !res.has_body() && res.status_code() != StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        let policy = CachePolicy::derive(req, &self.config);
        trace!(path = req.path(), no_cache = policy.no_cache, "applying cache policy");
        policy.apply(res, self.config.ttl_secs);
        Ok(())
    }
}

fn has_segment(path: &str, segment: &str) -> bool {
    path.split('/').any(|s| s == segment)
}

fn ttl(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Generate an `ETag` from content using fast hashing.
///
/// Returns a quoted value such as `"abc123def"`.
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// Whether a client's `If-None-Match` header matches `etag`.
///
/// Accepts a single tag, a comma-separated list, or `*`. Comparison is weak:
/// a `W/` prefix on either side is ignored.
pub fn etag_matches(if_none_match: Option<&str>, etag: &str) -> bool {
    let etag = opaque(etag);
    if_none_match.is_some_and(|client| {
        client.split(',').map(str::trim).any(|e| e == "*" || opaque(e) == etag)
    })
}

fn opaque(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn request(path: &str) -> Request {
        Request::builder().uri(path).received_at(at_noon()).build()
    }

    fn static_response() -> Response {
        let mut res = Response::builder().status(StatusCode::NON_AUTHORITATIVE_INFORMATION).text("body");
        res.set_last_modified(Some(at_noon() - TimeDelta::days(3)));
        res.set_etag(Some("\"v1\"".to_owned()));
        res.set_expires(Some(at_noon() + TimeDelta::days(30)));
        res
    }

    fn filter(req: &Request, res: &mut Response) {
        CachePolicyFilter::default().after(req, res).unwrap();
    }

    #[test]
    fn nocache_segment_strips_validators() {
        let req = request("/static/nocache/logo.png");
        let mut res = static_response();
        filter(&req, &mut res);

        assert_eq!(res.cache_directives(), &[CacheDirective::NoCache]);
        assert_eq!(res.expires(), None);
        assert_eq!(res.last_modified(), None);
        assert_eq!(res.etag(), None);
    }

    #[test]
    fn cacheable_path_expires_one_day_after_receipt() {
        let req = request("/static/app.css");
        let mut res = static_response();
        filter(&req, &mut res);

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.expires(), Some(at_noon() + TimeDelta::days(1)));
        assert_eq!(res.last_modified(), None);
        assert_eq!(res.etag(), Some("\"v1\""));
        assert_eq!(res.cache_directives(), &[CacheDirective::MaxAge(86_400)]);
    }

    #[test]
    fn segment_must_match_whole() {
        let req = request("/static/nocache-theme/app.css");
        let mut res = static_response();
        filter(&req, &mut res);
        assert!(!res.cache_directives().contains(&CacheDirective::NoCache));
        assert!(res.expires().is_some());
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        for path in ["/static/app.css", "/static/nocache/logo.png"] {
            let req = request(path);
            let mut once = static_response();
            filter(&req, &mut once);
            let mut twice = static_response();
            filter(&req, &mut twice);
            filter(&req, &mut twice);

            assert_eq!(once.status_code(), twice.status_code());
            assert_eq!(once.expires(), twice.expires());
            assert_eq!(once.last_modified(), twice.last_modified());
            assert_eq!(once.etag(), twice.etag());
            assert_eq!(once.cache_directives(), twice.cache_directives());
        }
    }

    #[test]
    fn bodiless_response_is_untouched() {
        let req = request("/static/nocache/logo.png");
        let mut res = Response::status(StatusCode::NOT_FOUND);
        filter(&req, &mut res);

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert!(res.cache_directives().is_empty());
    }

    #[test]
    fn not_modified_on_nocache_path_loses_etag() {
        let req = request("/static/nocache/logo.png");
        let mut res = Response::status(StatusCode::NOT_MODIFIED);
        res.set_etag(Some("\"v1\"".to_owned()));
        filter(&req, &mut res);

        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.etag(), None);
        assert_eq!(res.cache_directives(), &[CacheDirective::NoCache]);
    }

    #[test]
    fn not_modified_on_cacheable_path_keeps_status_and_gains_expiry() {
        let req = request("/static/app.css");
        let mut res = Response::status(StatusCode::NOT_MODIFIED);
        res.set_etag(Some("\"v1\"".to_owned()));
        filter(&req, &mut res);

        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.etag(), Some("\"v1\""));
        assert_eq!(res.expires(), Some(at_noon() + TimeDelta::days(1)));
        assert_eq!(res.cache_directives(), &[CacheDirective::MaxAge(86_400)]);
        assert!(!res.has_body());
    }

    #[test]
    fn custom_ttl_and_marker() {
        let config = CacheConfig { ttl_secs: 60, nocache_segment: "fresh".to_owned() };
        let policy = CachePolicy::derive(&request("/a/fresh/b"), &config);
        assert!(policy.no_cache);

        let policy = CachePolicy::derive(&request("/a/nocache/b"), &config);
        assert!(!policy.no_cache);
        assert_eq!(policy.expiration, Some(at_noon() + TimeDelta::seconds(60)));
    }

    #[test]
    fn oversized_ttl_saturates() {
        let config = CacheConfig { ttl_secs: u64::MAX, ..CacheConfig::default() };
        let policy = CachePolicy::derive(&request("/x"), &config);
        assert!(!policy.no_cache);
        assert_eq!(policy.expiration, None);
    }

    #[test]
    fn etag_is_stable_and_content_sensitive() {
        let a = generate_etag(b"same content");
        assert_eq!(a, generate_etag(b"same content"));
        assert_ne!(a, generate_etag(b"other content"));
        assert!(a.starts_with('"') && a.ends_with('"'));
    }

    #[test]
    fn if_none_match_forms() {
        let etag = "\"abc123\"";
        assert!(etag_matches(Some("\"abc123\""), etag));
        assert!(etag_matches(Some("\"xyz\", \"abc123\""), etag));
        assert!(etag_matches(Some("*"), etag));
        assert!(!etag_matches(Some("\"different\""), etag));
        assert!(!etag_matches(None, etag));
    }

    #[test]
    fn if_none_match_compares_weakly() {
        assert!(etag_matches(Some("W/\"abc123\""), "\"abc123\""));
        assert!(etag_matches(Some("\"abc123\""), "W/\"abc123\""));
        assert!(!etag_matches(Some("W/\"other\""), "\"abc123\""));
    }
}
