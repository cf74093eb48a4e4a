//! Resumable uploads to the Drive upload endpoint.

pub mod engine;
pub mod session;

pub use engine::{ProgressFn, ResumableUpload, UploadOutcome};
pub use session::{blended_progress, confirmed_offset, content_range, content_range_probe};
