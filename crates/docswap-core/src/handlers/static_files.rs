//! Static file serving handler
//!
//! `/` maps to the document slot, `/X` maps to `root/X`. Paths are not
//! sanitized: `..` segments resolve relative to the root like any other
//! path, so the root should not sit next to anything sensitive.

use crate::document::DocumentSlot;
use crate::mime::mime_type;
use crate::{Method, Request, Response, ResponseBuilder, StatusCode};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Static file handler
pub struct StaticFiles {
    root: PathBuf,
    document: DocumentSlot,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, document: DocumentSlot) -> Self {
        Self {
            root: root.into(),
            document,
        }
    }

    /// Handle request for static file
    pub async fn handle(&self, req: &Request) -> Response {
        // Only handle GET and HEAD
        if !req.method.is_read() {
            return Response::method_not_allowed();
        }

        let path = self.resolve(&req.decoded_path());

        match tokio::fs::metadata(&path).await {
            Ok(meta) if !meta.is_dir() => self.serve_file(&path, req).await,
            _ => {
                info!(path = %path.display(), "file not found");
                Response::not_found()
            }
        }
    }

    /// Map a decoded request path to a file
    pub fn resolve(&self, request_path: &str) -> PathBuf {
        if request_path == "/" || request_path.is_empty() {
            return self.document.path().to_path_buf();
        }
        self.root.join(request_path.trim_start_matches('/'))
    }

    async fn serve_file(&self, path: &Path, req: &Request) -> Response {
        // Metadata succeeded but the file may vanish before the read (upload swap)
        let content = match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "read failed");
                return Response::not_found();
            }
        };

        let mime = mime_type(path);
        info!(
            client = %req.client_ip(),
            path = %path.display(),
            mime,
            "serving file"
        );

        let builder = ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", mime)
            .header("Content-Length", content.len().to_string());

        // HEAD request - no body
        if req.method == Method::Head {
            builder.build()
        } else {
            builder.body(content).build()
        }
    }
}
