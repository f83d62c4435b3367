//! Built-in pipeline stages.
//!
//! Stages are the place for cross-cutting concerns. The built-ins:
//!
//! - [`cache`]: `Cache-Control` / `Expires` policy for static content (post hook)
//! - [`compression`]: `Accept-Encoding` negotiation and body encoding (post hook)
//! - [`guard`]: short-circuiting request checks such as authentication (pre hook)
//! - [`extension`]: injects a shared context object into requests (pre hook)
//!
//! Recommended order, outermost first: compression, guards, routing, and
//! caching attached to the static-content route only.

pub mod cache;
pub mod compression;
pub mod extension;
pub mod guard;
