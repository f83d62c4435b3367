//! Pipeline composition.
//!
//! A [`Pipeline`] is a terminal handler wrapped by an ordered list of
//! [`Stage`]s. Each stage gets a hook before the request goes inward and a
//! hook after the response comes back out:
//!
//! ```text
//!  request ─► s1.before ─► s2.before ─► terminal ─┐
//!                                                 │
//! response ◄─ s1.after  ◄─ s2.after  ◄────────────┘
//! ```
//!
//! The order is fixed when the pipeline is built. Hooks run in a plain loop,
//! not through nested closures, so deep stacks cost no call-stack depth.

use std::sync::Arc;

use http::StatusCode;
use tracing::{error, trace};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// What a [`Stage::before`] hook decided.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Stop here and answer with this response. Stages further in and the
    /// terminal handler are skipped.
    Respond(Response),
}

/// A pre/post hook pair.
///
/// Hooks are synchronous in-memory transforms and must not block. Both
/// default to doing nothing, so a stage implements only the side it needs.
pub trait Stage: Send + Sync + 'static {
    /// Short name used in logs and fault messages.
    fn name(&self) -> &'static str;

    fn before(&self, _req: &mut Request) -> Result<Flow, Error> {
        Ok(Flow::Continue)
    }

    fn after(&self, _req: &Request, _res: &mut Response) -> Result<(), Error> {
        Ok(())
    }
}

/// An ordered chain of stages around a terminal handler.
///
/// The first stage added is the outermost. A pipeline is itself a
/// [`Handler`], so it can guard a single route as easily as a whole router:
///
/// ```rust,no_run
/// use trellis::{CachePolicyFilter, CompressionNegotiator, Config, MatchMode, Pipeline, Router, StaticFiles};
///
/// let config = Config::default();
/// let assets = Pipeline::new(StaticFiles::new("public"))
///     .stage(CachePolicyFilter::new(config.cache.clone()));
///
/// let app = Pipeline::new(Router::new().route("/static", MatchMode::StartsWith, assets))
///     .stage(CompressionNegotiator::new(config.compression.clone()));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    terminal: BoxedHandler,
}

impl Pipeline {
    pub fn new(terminal: impl Handler) -> Self {
        Self { stages: Vec::new().into(), terminal: Arc::new(terminal) }
    }

    /// Appends a stage inside all previously added ones.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        let mut stages = self.stages.to_vec();
        stages.push(Arc::new(stage));
        self.stages = stages.into();
        self
    }

    /// Runs the pipeline and never fails: a fault anywhere becomes
    /// `500 Internal Server Error`.
    pub async fn handle(&self, req: Request) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();
        match self.call(req).await {
            Ok(res) => res,
            Err(err) => {
                error!(%method, %path, error = %err, "request failed");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl Handler for Pipeline {
    fn call(&self, req: Request) -> BoxFuture {
        let stages = Arc::clone(&self.stages);
        let terminal = Arc::clone(&self.terminal);
        Box::pin(run(stages, terminal, req))
    }
}

async fn run(
    stages: Arc<[Arc<dyn Stage>]>,
    terminal: BoxedHandler,
    mut req: Request,
) -> Result<Response, Error> {
    let mut entered = 0;
    let mut early = None;

    for stage in stages.iter() {
        trace!(stage = stage.name(), "before");
        match stage.before(&mut req)? {
            Flow::Continue => entered += 1,
            Flow::Respond(res) => {
                trace!(stage = stage.name(), "short-circuit");
                early = Some(res);
                break;
            }
        }
    }

    let (req, mut res) = match early {
        Some(res) => (req, res),
        None => {
            let view = req.clone();
            let res = terminal.call(req).await?;
            (view, res)
        }
    };

    for stage in stages[..entered].iter().rev() {
        trace!(stage = stage.name(), "after");
        stage.after(&req, &mut res)?;
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, try_handler_fn};
    use std::sync::Mutex;

    /// Records hook order into a shared log.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        stop: bool,
    }

    impl Stage for Recorder {
        fn name(&self) -> &'static str { self.name }

        fn before(&self, _req: &mut Request) -> Result<Flow, Error> {
            self.log.lock().unwrap().push(format!("{}.before", self.name));
            if self.stop {
                Ok(Flow::Respond(Response::status(StatusCode::UNAUTHORIZED)))
            } else {
                Ok(Flow::Continue)
            }
        }

        fn after(&self, _req: &Request, _res: &mut Response) -> Result<(), Error> {
            self.log.lock().unwrap().push(format!("{}.after", self.name));
            Ok(())
        }
    }

    struct Fails;

    impl Stage for Fails {
        fn name(&self) -> &'static str { "fails" }

        fn after(&self, _req: &Request, _res: &mut Response) -> Result<(), Error> {
            Err(Error::stage("fails", "boom"))
        }
    }

    fn recording_stage(name: &'static str, log: &Arc<Mutex<Vec<String>>>, stop: bool) -> Recorder {
        Recorder { name, log: Arc::clone(log), stop }
    }

    fn recording_terminal(log: Arc<Mutex<Vec<String>>>) -> impl Handler {
        handler_fn(move |_req: Request| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("terminal".to_owned());
                Response::text("ok")
            }
        })
    }

    #[tokio::test]
    async fn hooks_run_in_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(recording_terminal(Arc::clone(&log)))
            .stage(recording_stage("outer", &log, false))
            .stage(recording_stage("inner", &log, false));

        let res = pipeline.handle(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            ["outer.before", "inner.before", "terminal", "inner.after", "outer.after"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream_and_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(recording_terminal(Arc::clone(&log)))
            .stage(recording_stage("outer", &log, false))
            .stage(recording_stage("guard", &log, true))
            .stage(recording_stage("inner", &log, false));

        let res = pipeline.handle(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(*log.lock().unwrap(), ["outer.before", "guard.before", "outer.after"]);
    }

    #[tokio::test]
    async fn stage_fault_becomes_500() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(recording_terminal(Arc::clone(&log)))
            .stage(recording_stage("outer", &log, false))
            .stage(Fails);

        let res = pipeline.handle(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        // The fault aborts the remaining post hooks.
        assert_eq!(*log.lock().unwrap(), ["outer.before", "terminal"]);
    }

    #[tokio::test]
    async fn handler_fault_skips_post_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = try_handler_fn(|_req: Request| async {
            Err::<Response, _>(std::io::Error::other("backend down"))
        });
        let pipeline = Pipeline::new(terminal).stage(recording_stage("outer", &log, false));

        let err = pipeline.call(Request::builder().build()).await.unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
        assert_eq!(*log.lock().unwrap(), ["outer.before"]);
    }

    #[tokio::test]
    async fn post_hooks_see_pre_hook_extensions() {
        struct Tag;
        impl Stage for Tag {
            fn name(&self) -> &'static str { "tag" }
            fn before(&self, req: &mut Request) -> Result<Flow, Error> {
                req.extensions_mut().insert(5_u8);
                Ok(Flow::Continue)
            }
            fn after(&self, req: &Request, res: &mut Response) -> Result<(), Error> {
                if req.extension::<u8>() == Some(&5) {
                    res.set_status(StatusCode::ACCEPTED);
                }
                Ok(())
            }
        }

        let pipeline = Pipeline::new(handler_fn(|_req: Request| async { "ok" })).stage(Tag);
        let res = pipeline.handle(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    }
}
