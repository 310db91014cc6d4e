//! Resumable chunked file uploads.
//!
//! A file is partitioned into fixed-size chunks and hashed ([`partition`]),
//! tracked in an [`UploadSession`], and driven through precheck, per-chunk
//! test, per-chunk upload and merge by a [`Scheduler`] over a caller-supplied
//! [`Transport`]. [`Uploader`] adds a file list with per-file status on top.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod logging;
pub mod partition;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod transport;
pub mod uploader;

pub use config::{FieldInjector, FieldInjectors, RequestOptions, UploadConfig};
pub use error::UploadError;
pub use events::{NoEvents, UploadEvents};
pub use scheduler::{Scheduler, Stage};
pub use session::{Chunk, SessionId, UploadSession};
pub use source::SourceFile;
pub use transport::{CurlTransport, Transport};
pub use uploader::{FileStatus, UploadFile, Uploader};
