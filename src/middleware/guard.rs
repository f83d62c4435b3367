//! Short-circuiting request guards.
//!
//! A [`Guard`] inspects the request before anything further in the pipeline
//! runs. Rejecting answers immediately: inner stages and the terminal handler
//! never see the request.

use tracing::debug;

use crate::error::Error;
use crate::pipeline::{Flow, Stage};
use crate::request::Request;
use crate::response::Response;

/// Pre-hook stage backed by a check function.
///
/// ```rust
/// use http::StatusCode;
/// use trellis::{Guard, Request, Response};
///
/// let api_key = Guard::new("api-key", |req: &Request| match req.header("x-api-key") {
///     Some("secret") => Ok(()),
///     _ => Err(Response::status(StatusCode::UNAUTHORIZED)),
/// });
/// ```
pub struct Guard<F> {
    name: &'static str,
    check: F,
}

impl<F> Guard<F>
where
    F: Fn(&Request) -> Result<(), Response> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, check: F) -> Self {
        Self { name, check }
    }
}

impl<F> Stage for Guard<F>
where
    F: Fn(&Request) -> Result<(), Response> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str { self.name }

    fn before(&self, req: &mut Request) -> Result<Flow, Error> {
        match (self.check)(req) {
            Ok(()) => Ok(Flow::Continue),
            Err(res) => {
                debug!(guard = self.name, path = req.path(), status = %res.status_code(), "request rejected");
                Ok(Flow::Respond(res))
            }
        }
    }
}
