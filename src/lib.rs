//! # trellis
//!
//! Ordered HTTP routing with caching and compression stages, for services
//! that mostly hand out static content plus a few dynamic endpoints.
//!
//! ## The pieces
//!
//! - [`Router`]: rules checked in registration order, first match wins.
//!   EXACT rules bind `{name}` placeholders; STARTS_WITH rules consume a
//!   prefix and may hand the rest of the path to a nested table.
//! - [`Pipeline`]: a handler wrapped in [`Stage`]s, each with a hook before
//!   the request goes in and after the response comes out.
//! - [`CachePolicyFilter`]: `Expires` one day out for static content, or
//!   `Cache-Control: no-cache` for paths with a `nocache` segment.
//! - [`CompressionNegotiator`]: gzip/deflate chosen from `Accept-Encoding`.
//! - [`StaticFiles`]: the file provider the cache filter decorates.
//! - [`Server`]: hyper underneath, one task per connection, graceful
//!   shutdown.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::{
//!     handler_fn, CachePolicyFilter, CompressionNegotiator, Config, MatchMode, Pipeline,
//!     Request, Response, Router, Server, StaticFiles,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trellis::Error> {
//!     let config = Config::default();
//!
//!     // Caching wraps only the static sub-route.
//!     let assets = Pipeline::new(StaticFiles::new("public"))
//!         .stage(CachePolicyFilter::new(config.cache.clone()));
//!
//!     let router = Router::new()
//!         .route("/static",     MatchMode::StartsWith, assets)
//!         .route("/users/{id}", MatchMode::Exact,      handler_fn(get_user));
//!
//!     // Compression wraps everything.
//!     let app = Pipeline::new(router)
//!         .stage(CompressionNegotiator::new(config.compression.clone()));
//!
//!     Server::from_config(&config.server)?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```

mod config;
mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod static_files;

pub mod middleware;

pub use config::{CacheConfig, CompressionConfig, Config, ServerConfig};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, FnHandler, Handler, TryFnHandler, handler_fn, try_handler_fn};
pub use middleware::cache::{CachePolicy, CachePolicyFilter};
pub use middleware::compression::{CompressionNegotiator, Encoding};
pub use middleware::extension::Extension;
pub use middleware::guard::Guard;
pub use pipeline::{Flow, Pipeline, Stage};
pub use request::{Request, RequestBuilder};
pub use response::{Body, CacheDirective, ContentType, IntoResponse, Response, ResponseBuilder, http_date};
pub use router::{MatchMode, Matched, NotFound, Router};
pub use server::Server;
pub use static_files::{StaticFiles, content_type};
