//! # runtime
//!
//! Core subsystems for an embedded JavaScript runtime: the module registry
//! and loader, the stream/handle model (TCP/Pipe/TTY/UDP/TLS), worker
//! concurrency, timers, and the runtime shell tying an engine (`rquickjs`)
//! to a reactor (`tokio`).
//!
//! `runtime-cli`, `demos`, and `scenario-tests` are the thin binaries that
//! build on this crate; this crate itself never installs a logging
//! subscriber or parses CLI arguments.

pub mod buffer;
pub mod error;
pub mod fs;
pub mod modules;
pub mod options;
pub mod process;
pub mod promise;
pub mod streams;
pub mod timers;
pub mod uart;
pub mod vm;
pub mod worker;

pub use error::RuntimeError;
pub use options::{RuntimeOptions, UnhandledRejection};
pub use vm::Runtime;
