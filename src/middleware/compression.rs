//! Response compression by content negotiation.
//!
//! The negotiator will **not** encode a response when:
//! - the client accepts none of the configured encodings
//! - `Content-Encoding` is already set
//! - the status is `204 No Content` or `304 Not Modified`, or there is no body
//! - the body is shorter than the configured minimum size
//! - the content type is already compressed (`image/*` except SVG, audio,
//!   video, archives)
//!
//! When it does encode, `Content-Encoding` names the codec and
//! `Vary: Accept-Encoding` is added. [`Response::logical_len`] keeps
//! reporting the unencoded length.

use std::fmt;
use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression as Level;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use http::header::{self, HeaderValue};
use http::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::CompressionConfig;
use crate::error::Error;
use crate::pipeline::Stage;
use crate::request::Request;
use crate::response::{Body, Response};

/// A non-identity content coding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Gzip,
    /// HTTP `deflate`, i.e. zlib-wrapped DEFLATE.
    Deflate,
}

impl Encoding {
    /// The token used in `Accept-Encoding` and `Content-Encoding`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    fn accepts_token(self, token: &str) -> bool {
        match self {
            Self::Gzip => token == "gzip" || token == "x-gzip",
            Self::Deflate => token == "deflate",
        }
    }

    pub fn encode(self, data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
        let level = Level::new(level.min(9));
        match self {
            Self::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
            Self::Deflate => {
                let mut enc = ZlibEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
        }
    }

    pub fn decode(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Gzip => GzDecoder::new(data).read_to_end(&mut out)?,
            Self::Deflate => ZlibDecoder::new(data).read_to_end(&mut out)?,
        };
        Ok(out)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `Accept-Encoding` entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Preference {
    pub token: String,
    pub weight: f32,
}

/// Parses an `Accept-Encoding` value into tokens and weights.
///
/// Tokens are lower-cased. A missing `q` means `1.0`; an unparseable or
/// out-of-range `q` drops the entry.
pub fn parse_accept_encoding(value: &str) -> Vec<Preference> {
    value
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let token = parts.next()?.trim().to_ascii_lowercase();
            if token.is_empty() {
                return None;
            }
            let mut weight = 1.0;
            for param in parts {
                let Some((key, val)) = param.split_once('=') else { continue };
                if key.trim().eq_ignore_ascii_case("q") {
                    weight = val.trim().parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q))?;
                }
            }
            Some(Preference { token, weight })
        })
        .collect()
}

/// Picks the encoding to use, or `None` for identity.
///
/// Each supported encoding takes the weight of its explicit entry, else the
/// weight of `*`. The highest positive weight wins; ties go to the earlier
/// entry in `supported`.
pub fn negotiate(accept_encoding: Option<&str>, supported: &[Encoding]) -> Option<Encoding> {
    let prefs = parse_accept_encoding(accept_encoding?);
    let wildcard = prefs.iter().find(|p| p.token == "*").map(|p| p.weight);

    let mut best: Option<(Encoding, f32)> = None;
    for &encoding in supported {
        let weight = prefs
            .iter()
            .find(|p| encoding.accepts_token(&p.token))
            .map(|p| p.weight)
            .or(wildcard)
            .unwrap_or(0.0);
        if weight > 0.0 && best.is_none_or(|(_, w)| weight > w) {
            best = Some((encoding, weight));
        }
    }
    best.map(|(encoding, _)| encoding)
}

/// Post-hook stage that encodes response bodies the client can accept.
pub struct CompressionNegotiator {
    config: CompressionConfig,
}

impl CompressionNegotiator {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    fn eligible(&self, res: &Response) -> bool {
        if !res.has_body()
            || res.encoding().is_some()
            || res.headers().contains_key(header::CONTENT_ENCODING)
            || matches!(res.status_code(), StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED)
        {
            return false;
        }
        if res.logical_len().is_some_and(|len| len < self.config.min_size) {
            return false;
        }
        res.header("content-type").is_none_or(compressible)
    }
}

impl Default for CompressionNegotiator {
    fn default() -> Self { Self::new(CompressionConfig::default()) }
}

impl Stage for CompressionNegotiator {
    fn name(&self) -> &'static str { "compression" }

    fn after(&self, req: &Request, res: &mut Response) -> Result<(), Error> {
        if !self.eligible(res) {
            return Ok(());
        }
        let accept = req.header("accept-encoding");
        let Some(encoding) = negotiate(accept, &self.config.encodings) else {
            debug!(accept, "no acceptable encoding, passing through");
            return Ok(());
        };

        debug!(%encoding, "encoding response");
        let level = self.config.level;
        res.try_map_body(|body| {
            Ok(match body {
                Body::Full(bytes) => Body::Full(encode_bytes(encoding, &bytes, level)?),
                Body::Lazy(produce) => {
                    Body::lazy(move || encode_bytes(encoding, &produce()?, level))
                }
                Body::Empty => Body::Empty,
            })
        })?;
        res.set_encoding(encoding);
        weaken_etag(res);
        if !varies_on_encoding(res.headers()) {
            res.headers_mut()
                .append(header::VARY, HeaderValue::from_static("accept-encoding"));
        }
        Ok(())
    }
}

/// The encoded body is a different representation, so a strong validator
/// for the identity bytes no longer holds.
fn weaken_etag(res: &mut Response) {
    let weak = match res.etag() {
        Some(tag) if !tag.starts_with("W/") => format!("W/{tag}"),
        _ => return,
    };
    res.set_etag(Some(weak));
}

fn varies_on_encoding(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"))
}

fn encode_bytes(encoding: Encoding, data: &[u8], level: u32) -> Result<Bytes, Error> {
    Ok(encoding.encode(data, level)?.into())
}

/// Content types that gain nothing from another compression pass.
fn compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if mime == "image/svg+xml" {
        return true;
    }
    !(mime.starts_with("image/")
        || mime.starts_with("audio/")
        || mime.starts_with("video/")
        || matches!(
            mime.as_str(),
            "application/zip" | "application/gzip" | "application/x-tar" | "font/woff2"
        ))
}
