//! Fatal diagnostics.
//!
//! Nothing in this crate has a recoverable error channel at the call site. Validation is written
//! with `eyre`, and the public entry points turn a failed validation into a fatal diagnostic
//! naming the failing operation. A partially applied operator has no meaningful result, so there
//! is nothing to hand back to the caller.
use log::error;
use std::fmt::Display;

/// Logs the diagnostic and aborts the current operation by panicking.
///
/// Build with `panic = "abort"` to turn this into a process abort.
#[track_caller]
pub fn fatal(operation: &str, reason: impl Display) -> ! {
    error!("{}: {}", operation, reason);
    panic!("{}: {}", operation, reason)
}

/// Conversion of a validation result into its value or a fatal diagnostic.
pub(crate) trait OrFatal<T> {
    fn or_fatal(self, operation: &str) -> T;
}

impl<T> OrFatal<T> for eyre::Result<T> {
    #[track_caller]
    fn or_fatal(self, operation: &str) -> T {
        match self {
            Ok(value) => value,
            Err(report) => fatal(operation, format_args!("{:#}", report)),
        }
    }
}
