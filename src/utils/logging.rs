//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("got position with accuracy {:.1}m", accuracy);
//! ```
//!
//! Every message is prefixed with the calling module path so the
//! acquisition and evaluation steps of one locate can be followed in a
//! single `RUST_LOG=info` stream.

#[doc(hidden)]
#[macro_export]
macro_rules! __geo_log {
    ($level:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::log!(target: module_path!(), $level, $($arg)*);
        }
    };
}

/// Debug-level message, compiled out of the log stream when `ENABLE_LOGS` is false.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::__geo_log!(log::Level::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::__geo_log!(log::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::__geo_log!(log::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::__geo_log!(log::Level::Error, $($arg)*)
    };
}
