//! Configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup: one-day expiry, `nocache` as the opt-out marker, gzip then
//! deflate.
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:3000"
//! max_body_bytes = 2097152
//!
//! [cache]
//! ttl_secs = 86400
//! nocache_segment = "nocache"
//!
//! [compression]
//! encodings = ["gzip", "deflate"]
//! min_size = 0
//! level = 6
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::middleware::compression::Encoding;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub compression: CompressionConfig,
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a TOML file. Meant for startup, not request paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Request bodies longer than this are refused with `413`.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: "0.0.0.0:3000".to_owned(), max_body_bytes: 2 * 1024 * 1024 }
    }
}

/// Settings for [`CachePolicyFilter`](crate::CachePolicyFilter).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cacheable responses, in seconds.
    pub ttl_secs: u64,
    /// A path segment that opts a response out of caching.
    pub nocache_segment: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400, nocache_segment: "nocache".to_owned() }
    }
}

/// Settings for [`CompressionNegotiator`](crate::CompressionNegotiator).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Supported encodings in server preference order.
    pub encodings: Vec<Encoding>,
    /// Bodies shorter than this many bytes are sent as-is.
    pub min_size: usize,
    /// flate2 compression level, 0-9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { encodings: vec![Encoding::Gzip, Encoding::Deflate], min_size: 0, level: 6 }
    }
}
