//! # Module Registry & Loader
//!
//! A process-thread-local table of `{name -> bytecode}` ([`registry`]),
//! trailer-appended bundle discovery in the host executable ([`bundle`]),
//! and the name-normalization/per-kind dispatch that `rquickjs` calls into
//! when resolving an `import` ([`loader`]).

pub mod bundle;
pub mod loader;
pub mod registry;

pub use loader::{CoreLoader, CoreResolver};
pub use registry::ModuleRegistry;
