//! # Module Registry
//!
//! An in-process table of `{name -> bytecode}`. The original design keys a
//! singly linked list by name; a `HashMap` gives the same append-or-replace,
//! O(1) exact-name lookup behavior without the manual list-walk, and makes
//! the exact-match rule below (rather than the original's prefix match) the
//! natural implementation instead of a bolt-on check.

use std::collections::HashMap;
use std::sync::Arc;

/// Names beginning with this prefix resolve only against the registry, never
/// against the filesystem.
pub const INTERNAL_PREFIX: char = '@';

/// Internal module names that may never be `import`ed directly — they are
/// constructor-injected into bootstrap code instead.
pub const INTERNAL_WHITELIST: &[&str] = &[
    "@tjs/native-bootstrap",
    "@tjs/bootstrap",
    "@tjs/navigator",
    "@tjs/url",
    "@tjs/performance",
    "@tjs/abort-controller",
    "@tjs/worker-bootstrap",
];

/// Holds every module bytecode blob known to one runtime thread.
///
/// Immutable after startup: entries are only ever appended or replaced
/// during registration, then read without synchronization, matching the
/// "process-global mutable but initialized exactly once" discipline of the
/// handle registry this is modeled on.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    entries: HashMap<String, Arc<[u8]>>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name -> bytecode`, replacing any existing entry.
    pub fn register(&mut self, name: impl Into<String>, bytecode: impl Into<Arc<[u8]>>) {
        self.entries.insert(name.into(), bytecode.into());
    }

    /// Looks up a module by exact name, per the corrected (non-prefix-match)
    /// resolution rule.
    pub fn lookup(&self, name: &str) -> Option<Arc<[u8]>> {
        if let Some(data) = self.entries.get(name) {
            return Some(data.clone());
        }
        for suffix in [".js", ".mjs"] {
            if let Some(data) = self.entries.get(&format!("{name}{suffix}")) {
                return Some(data.clone());
            }
        }
        None
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones this registry's committed entries, the view a worker thread
    /// starts from (spec.md §5: "new workers observe its committed state").
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// True when `name` is on the internal whitelist and may not be imported
    /// directly.
    pub fn is_rejected_internal(name: &str) -> bool {
        INTERNAL_WHITELIST.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_does_not_collide_on_shared_prefix() {
        let mut reg = ModuleRegistry::new();
        reg.register("@tjs/fs", b"fs-bytecode".as_slice());
        reg.register("@tjs/fs-extra", b"fs-extra-bytecode".as_slice());
        assert_eq!(reg.lookup("@tjs/fs").unwrap().as_ref(), b"fs-bytecode");
        assert_eq!(
            reg.lookup("@tjs/fs-extra").unwrap().as_ref(),
            b"fs-extra-bytecode"
        );
    }

    #[test]
    fn lookup_falls_back_to_js_and_mjs_suffixes() {
        let mut reg = ModuleRegistry::new();
        reg.register("helpers.mjs", b"helper-bytecode".as_slice());
        assert_eq!(
            reg.lookup("helpers").unwrap().as_ref(),
            b"helper-bytecode"
        );
    }

    #[test]
    fn replace_overwrites_prior_entry() {
        let mut reg = ModuleRegistry::new();
        reg.register("@tjs/url", b"v1".as_slice());
        reg.register("@tjs/url", b"v2".as_slice());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("@tjs/url").unwrap().as_ref(), b"v2");
    }

    #[test]
    fn fork_is_an_independent_snapshot() {
        let mut reg = ModuleRegistry::new();
        reg.register("@tjs/url", b"v1".as_slice());
        let mut child = reg.fork();
        child.register("@tjs/url", b"v2".as_slice());
        assert_eq!(reg.lookup("@tjs/url").unwrap().as_ref(), b"v1");
        assert_eq!(child.lookup("@tjs/url").unwrap().as_ref(), b"v2");
    }
}
