//! Built-in request handlers

pub mod static_files;
pub mod upload;

pub use static_files::StaticFiles;
pub use upload::{RestartHook, UploadError, UploadHandler, DEFAULT_RESTART_DELAY};
