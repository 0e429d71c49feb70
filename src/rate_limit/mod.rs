//! Upload admission limits.
//!
//! Per-user sliding windows over recent uploads, kept in memory. State is
//! not persisted across restarts.

mod uploads;

pub use uploads::{UploadLimiter, UploadStats};
