//! # Runtime Options
//!
//! Construction-time options recognized per spec.md §6, shaped as a
//! `serde`-derived struct with `Default`, following `LoggerLocalOptions`'s
//! pattern of "an options struct with sensible defaults, constructed by the
//! host binary and passed into the library type's constructor".

use serde::{Deserialize, Serialize};

/// What happens when a promise rejection goes unhandled, spec.md §4.1/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledRejection {
    /// Log the rejection and continue running.
    #[default]
    Log,
    /// Log the rejection, set a non-zero exit code, and stop the loop once
    /// current work drains.
    Reject,
}

/// Construction-time options for a [`crate::vm::Runtime`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// What to do with an unhandled promise rejection.
    pub unhandled_rejection: UnhandledRejection,
    /// Maximum engine heap size in bytes; `0` means unlimited.
    pub memory_limit: usize,
    /// Engine stack size in bytes.
    pub stack_size: usize,
    /// Dump a memory usage report to the log at shutdown.
    pub dump_memory: bool,
    /// Log every GC mark/sweep at trace level.
    pub trace_memory: bool,
    /// Initial process exit code.
    pub exit_code: i32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            unhandled_rejection: UnhandledRejection::default(),
            memory_limit: 0,
            stack_size: 1024 * 1024,
            dump_memory: false,
            trace_memory: false,
            exit_code: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_baseline() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.unhandled_rejection, UnhandledRejection::Log);
        assert_eq!(opts.memory_limit, 0);
        assert_eq!(opts.stack_size, 1024 * 1024);
        assert_eq!(opts.exit_code, 0);
    }

    #[test]
    fn deserializes_from_partial_json_with_defaults_filled_in() {
        let opts: RuntimeOptions =
            serde_json::from_str(r#"{"unhandledRejection":"reject"}"#).unwrap();
        assert_eq!(opts.unhandled_rejection, UnhandledRejection::Reject);
        assert_eq!(opts.stack_size, 1024 * 1024);
    }
}
