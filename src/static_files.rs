//! Static file provider.
//!
//! Serves files below a root directory, addressed by the request's
//! [remaining path](crate::Request::remaining): attach it under a STARTS_WITH
//! rule such as `/static` and `/static/css/app.css` reads `<root>/css/app.css`.
//!
//! Responses carry `Content-Type` (by extension), `Last-Modified` (file mtime)
//! and an `ETag` (content hash). A matching `If-None-Match` yields `304` with
//! no body. A path that does not resolve is a `404`; any other read failure is
//! returned as [`Error::Io`] so the pipeline answers `500`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::middleware::cache::{etag_matches, generate_etag};
use crate::request::Request;
use crate::response::Response;

/// Handler serving files from a directory.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    root: PathBuf,
    index_files: Vec<String>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), index_files: vec!["index.html".to_owned()] }
    }

    /// Files tried, in order, when the path names a directory.
    pub fn index_files(mut self, names: &[&str]) -> Self {
        self.index_files = names.iter().map(|n| (*n).to_owned()).collect();
        self
    }
}

impl Handler for StaticFiles {
    fn call(&self, req: Request) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move { this.serve(&req).await })
    }
}

impl StaticFiles {
    async fn serve(&self, req: &Request) -> Result<Response, Error> {
        if *req.method() != Method::GET && *req.method() != Method::HEAD {
            return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED));
        }
        let Some(path) = self.resolve(req.remaining()).await else {
            return Ok(Response::status(StatusCode::NOT_FOUND));
        };

        let (content, modified) = match load(&path).await {
            Ok(loaded) => loaded,
            // Removed between resolving and reading.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Response::status(StatusCode::NOT_FOUND));
            }
            Err(e) => return Err(e.into()),
        };

        let etag = generate_etag(&content);
        if etag_matches(req.header("if-none-match"), &etag) {
            debug!(path = %path.display(), "etag hit");
            let mut res = Response::status(StatusCode::NOT_MODIFIED);
            res.set_etag(Some(etag));
            return Ok(res);
        }

        let content_type = content_type(path.extension().and_then(|e| e.to_str()));
        let mut res = Response::builder().typed(content_type, content);
        res.set_etag(Some(etag));
        res.set_last_modified(modified);
        Ok(res)
    }

    /// Maps a request path onto a file inside the root, refusing anything
    /// that escapes it.
    async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.trim_start_matches('/');
        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            Err(e) => {
                warn!(root = %self.root.display(), "static root inaccessible: {e}");
                return None;
            }
        };

        let mut candidate = root.join(relative);
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_dir()) {
            candidate = self.find_index(&candidate).await?;
        }

        // A missing file is the common 404 case, not worth a log line.
        let canonical = fs::canonicalize(&candidate).await.ok()?;
        if !canonical.starts_with(&root) {
            warn!(path = request_path, "path traversal attempt blocked");
            return None;
        }
        Some(canonical)
    }

    async fn find_index(&self, dir: &Path) -> Option<PathBuf> {
        for name in &self.index_files {
            let candidate = dir.join(name);
            if fs::metadata(&candidate).await.is_ok() {
                return Some(candidate);
            }
        }
        None
    }
}

async fn load(path: &Path) -> std::io::Result<(Vec<u8>, Option<DateTime<Utc>>)> {
    let content = fs::read(path).await?;
    let modified = fs::metadata(path).await?.modified().ok().map(DateTime::<Utc>::from);
    Ok((content, modified))
}

/// MIME type by file extension.
pub fn content_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{self, HeaderValue};
    use tempfile::TempDir;

    use crate::pipeline::Pipeline;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("css/app.css"), "body { color: red }").unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        dir
    }

    fn get(path: &str) -> Request {
        Request::builder().uri(path).build()
    }

    #[tokio::test]
    async fn serves_file_with_validators() {
        let site = site();
        let res = StaticFiles::new(site.path()).serve(&get("/css/app.css")).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/css"));
        assert!(res.etag().is_some());
        assert!(res.last_modified().is_some());
        assert_eq!(res.logical_len(), Some("body { color: red }".len()));
    }

    #[tokio::test]
    async fn directory_resolves_to_index() {
        let site = site();
        let res = StaticFiles::new(site.path()).serve(&get("/docs/")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn missing_and_escaping_paths_are_404() {
        let site = site();
        let files = StaticFiles::new(site.path());
        let missing = files.serve(&get("/nope.css")).await.unwrap();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        let escaping = files.serve(&get("/../../etc/passwd")).await.unwrap();
        assert_eq!(escaping.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unreadable_entry_is_an_error_not_a_404() {
        let site = site();
        // An index name that is itself a directory resolves but cannot be read.
        std::fs::create_dir_all(site.path().join("broken/index.html")).unwrap();
        let files = StaticFiles::new(site.path());

        let err = files.serve(&get("/broken/")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let res = Pipeline::new(files).handle(get("/broken/")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn matching_etag_is_304_without_body() {
        let site = site();
        let files = StaticFiles::new(site.path());
        let first = files.serve(&get("/css/app.css")).await.unwrap();
        let etag = first.etag().unwrap().to_owned();

        let req = Request::builder()
            .uri("/css/app.css")
            .header(header::IF_NONE_MATCH, HeaderValue::from_str(&etag).unwrap())
            .build();
        let res = files.serve(&req).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert!(!res.has_body());
        assert_eq!(res.etag(), Some(etag.as_str()));
    }

    #[tokio::test]
    async fn rejects_writes() {
        let site = site();
        let req = Request::builder().method(Method::POST).uri("/css/app.css").build();
        let res = StaticFiles::new(site.path()).serve(&req).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type(Some("html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Some("png")), "image/png");
        assert_eq!(content_type(Some("xyz")), "application/octet-stream");
        assert_eq!(content_type(None), "application/octet-stream");
    }
}
