//! Utility modules for guidprobe

pub mod logging;

pub use logging::{init_default, init_logging, LoggingConfig};
