//! HTTP server and graceful shutdown.
//!
//! The server owns the transport: it accepts connections, reads request
//! bodies, runs the [`Pipeline`] once per request and writes the result. Every
//! connection gets its own task; the only thing tasks share is the immutable
//! pipeline (and the route table inside it).
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{BoxError, Error};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string. Use
    /// [`Server::from_config`] to get an error instead.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, max_body_bytes: ServerConfig::default().max_body_bytes }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        let addr = config.addr.parse().map_err(|source| Error::Addr {
            addr: config.addr.clone(),
            source,
        })?;
        Ok(Self { addr, max_body_bytes: config.max_body_bytes })
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Starts accepting connections and dispatching them through `pipeline`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let pipeline = Arc::new(pipeline);
        let limit = self.max_body_bytes;

        info!(addr = %self.addr, "trellis listening");

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for all of them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(&pipeline, req, limit).await }
                        });

                        // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever
                        // the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the JoinSet does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("trellis stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request, runs the pipeline, renders one response.
///
/// Every failure is turned into a status code here, so hyper never sees an
/// error.
async fn dispatch(
    pipeline: &Pipeline,
    req: hyper::Request<hyper::body::Incoming>,
    limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, limit).await {
        Ok(bytes) => bytes,
        Err(status) => {
            error!(path = parts.uri.path(), %status, "failed to read request body");
            return Ok(fallback(status));
        }
    };

    let response = pipeline.handle(Request::from_parts(parts, body)).await;
    Ok(render(response))
}

/// Collects at most `limit` bytes of body. Too long is `413`, anything else
/// that breaks the read is `400`.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, StatusCode>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
        Err(e) => {
            error!(error = %Error::Body(e), "request body stream failed");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

fn render(response: Response) -> http::Response<Full<Bytes>> {
    response.into_http().unwrap_or_else(|e| {
        error!(error = %e, "failed to produce response body");
        fallback(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

fn fallback(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_reports_bad_addresses() {
        let config = ServerConfig { addr: "not-an-addr".to_owned(), ..ServerConfig::default() };
        let err = Server::from_config(&config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Addr { .. }));
        assert!(err.to_string().contains("not-an-addr"));
    }

    #[test]
    fn from_config_accepts_defaults() {
        let server = Server::from_config(&ServerConfig::default()).unwrap();
        assert_eq!(server.addr().port(), 3000);
    }

    #[tokio::test]
    async fn body_within_limit_is_collected() {
        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(read_body(body, 10).await.unwrap(), "0123456789");
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(read_body(body, 9).await.unwrap_err(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn render_failure_becomes_500() {
        let res = Response::builder().typed(
            "text/plain",
            crate::response::Body::lazy(|| Err(Error::stage("producer", "gone"))),
        );
        assert_eq!(render(res).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
