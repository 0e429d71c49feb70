//! Display helpers shared by the CLI and log messages.

mod format;

pub use format::{format_duration, format_size};
