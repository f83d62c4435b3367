//! Context injection.
//!
//! Handlers get their collaborators (data-access handles, template engines,
//! configuration) from an explicitly constructed context object rather than a
//! process-wide singleton. [`Extension`] places a shared value into every
//! request's extensions; handlers read it back with
//! [`Request::extension`](crate::Request::extension).

use std::sync::Arc;

use crate::error::Error;
use crate::pipeline::{Flow, Stage};
use crate::request::Request;

/// Pre-hook stage that inserts `Arc<T>` into each request.
pub struct Extension<T> {
    value: Arc<T>,
}

impl<T: Send + Sync + 'static> Extension<T> {
    pub fn new(value: Arc<T>) -> Self {
        Self { value }
    }
}

impl<T: Send + Sync + 'static> Stage for Extension<T> {
    fn name(&self) -> &'static str { "extension" }

    fn before(&self, req: &mut Request) -> Result<Flow, Error> {
        req.extensions_mut().insert(Arc::clone(&self.value));
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::pipeline::Pipeline;
    use crate::response::Response;

    struct Catalog {
        title: &'static str,
    }

    #[tokio::test]
    async fn handlers_read_the_injected_context() {
        let pipeline = Pipeline::new(handler_fn(|req: Request| async move {
            match req.extension::<Arc<Catalog>>() {
                Some(catalog) => Response::text(catalog.title),
                None => Response::text("missing"),
            }
        }))
        .stage(Extension::new(Arc::new(Catalog { title: "spring" })));

        let res = pipeline.handle(Request::builder().build()).await;
        let body = res.into_http().unwrap();
        assert_eq!(body.headers()["content-type"], "text/plain; charset=utf-8");
        assert!(matches!(
            http_body_util::BodyExt::collect(body.into_body()).await.map(|c| c.to_bytes()),
            Ok(bytes) if &bytes[..] == b"spring"
        ));
    }
}
