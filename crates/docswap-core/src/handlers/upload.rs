//! Document upload handler
//!
//! Accepts `POST <upload path>` with a single-file `multipart/form-data`
//! body, swaps the payload into the document slot and schedules a deferred
//! server restart through an injected hook. Every reply is
//! `{"success": bool, "message": string}` with `Access-Control-Allow-Origin: *`.

use crate::document::{DocumentSlot, SwapError};
use crate::{Method, Request, Response, ResponseBuilder, StatusCode};
use docswap_multipart::{boundary, extract_file, is_form_data, ExtractError};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Default delay between a successful upload and the server restart
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Deferred action run after a successful swap
pub type RestartHook =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Upload failures, each mapped to a status code
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid content type")]
    InvalidContentType,

    #[error("Invalid boundary")]
    MissingBoundary,

    #[error("No file content found: {0}")]
    NoFileContent(#[from] ExtractError),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Server error: {0}")]
    Swap(#[from] SwapError),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            UploadError::InvalidContentType
            | UploadError::MissingBoundary
            | UploadError::NoFileContent(_) => StatusCode::BAD_REQUEST,
            UploadError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Swap(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message
    pub fn message(&self) -> String {
        match self {
            UploadError::Swap(SwapError::WriteTemp { .. }) => {
                "Could not write uploaded file".to_string()
            }
            UploadError::Swap(SwapError::RemoveDocument { .. }) => {
                "Could not delete current document".to_string()
            }
            UploadError::Swap(SwapError::DocumentLost { .. }) => {
                "Could not rename uploaded file, document is missing".to_string()
            }
            UploadError::Swap(SwapError::Rename { .. }) => {
                "Could not rename uploaded file".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn into_response(self) -> Response {
        reply(self.status(), false, &self.message())
    }
}

#[derive(Serialize)]
struct Reply<'a> {
    success: bool,
    message: &'a str,
}

fn reply(status: StatusCode, success: bool, message: &str) -> Response {
    let body = serde_json::to_vec(&Reply { success, message })
        .unwrap_or_else(|_| br#"{"success":false,"message":""}"#.to_vec());

    ResponseBuilder::new(status)
        .header("Content-Type", "application/json; charset=UTF-8")
        .header("Access-Control-Allow-Origin", "*")
        .body(body)
        .build()
}

/// Upload handler
pub struct UploadHandler {
    document: DocumentSlot,
    restart: RestartHook,
    restart_delay: Duration,
}

impl UploadHandler {
    pub fn new(document: DocumentSlot, restart: RestartHook) -> Self {
        Self {
            document,
            restart,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub async fn handle(&self, req: &Request) -> Response {
        match self.accept(req).await {
            Ok(bytes) => {
                info!(client = %req.client_ip(), bytes, "upload accepted, document replaced");
                self.schedule_restart();
                reply(StatusCode::OK, true, "File uploaded, server will restart")
            }
            Err(e) => {
                match &e {
                    UploadError::Swap(swap) if swap.document_lost() => {
                        error!(error = %swap, "upload swap lost the document")
                    }
                    UploadError::Swap(swap) => error!(error = %swap, "upload swap failed"),
                    other => warn!(client = %req.client_ip(), error = %other, "upload rejected"),
                }
                e.into_response()
            }
        }
    }

    /// Validate, extract and swap; returns the payload size
    async fn accept(&self, req: &Request) -> Result<usize, UploadError> {
        if req.method != Method::Post {
            return Err(UploadError::MethodNotAllowed);
        }

        let content_type = req
            .content_type()
            .filter(|ct| is_form_data(ct))
            .ok_or(UploadError::InvalidContentType)?;
        let token = boundary(content_type).ok_or(UploadError::MissingBoundary)?;

        let payload = extract_file(&req.body, token)?;
        self.document.swap(payload).await?;

        Ok(payload.len())
    }

    fn schedule_restart(&self) {
        let restart = self.restart.clone();
        let delay = self.restart_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            restart().await;
        });
    }
}
