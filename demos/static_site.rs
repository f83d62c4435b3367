//! Static site with a couple of dynamic endpoints.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example static_site -- trellis.toml
//!
//! Try:
//!   curl -i http://localhost:3000/static/index.html
//!   curl -i http://localhost:3000/static/nocache/index.html
//!   curl -i -H 'accept-encoding: gzip' http://localhost:3000/users/42
//!   curl -i -H 'x-api-key: secret' http://localhost:3000/admin/stats

use std::sync::Arc;

use http::StatusCode;
use trellis::{
    CachePolicyFilter, CompressionNegotiator, Config, Extension, Guard, MatchMode, Pipeline,
    Request, Response, Router, Server, StaticFiles, handler_fn,
};

/// Shared, read-only collaborators handed to handlers.
struct AppContext {
    site_name: String,
}

#[tokio::main]
async fn main() -> Result<(), trellis::Error> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let ctx = Arc::new(AppContext { site_name: "trellis demo".to_owned() });

    let assets = Pipeline::new(StaticFiles::new("public"))
        .stage(CachePolicyFilter::new(config.cache.clone()));

    let admin = Pipeline::new(handler_fn(stats)).stage(Guard::new(
        "api-key",
        |req: &Request| match req.header("x-api-key") {
            Some("secret") => Ok(()),
            _ => Err(Response::status(StatusCode::UNAUTHORIZED)),
        },
    ));

    let router = Router::new()
        .route("/static",     MatchMode::StartsWith, assets)
        .route("/admin",      MatchMode::StartsWith, admin)
        .route("/users/{id}", MatchMode::Exact,      handler_fn(get_user))
        .route("/",           MatchMode::Exact,      handler_fn(home));

    // Outermost first: compression, then context injection, then routing.
    let app = Pipeline::new(router)
        .stage(CompressionNegotiator::new(config.compression.clone()))
        .stage(Extension::new(ctx));

    Server::from_config(&config.server)?.serve(app).await
}

async fn home(req: Request) -> Response {
    let name = req
        .extension::<Arc<AppContext>>()
        .map_or("trellis", |ctx| ctx.site_name.as_str());
    Response::text(format!("welcome to {name}"))
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

async fn stats(_req: Request) -> Response {
    Response::json(br#"{"uptime":"ok"}"#.to_vec())
}
