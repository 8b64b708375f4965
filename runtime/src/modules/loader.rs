//! # Loader — Name Normalization & Per-Kind Dispatch
//!
//! `normalize` resolves a requested module specifier against the importing
//! module's own name; `classify` decides which of the four loader kinds a
//! normalized name dispatches to. The engine-facing `rquickjs::loader`
//! traits are implemented on [`CoreLoader`] and [`CoreResolver`], wiring this
//! logic into `rquickjs`'s module loading hooks.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rquickjs::loader::{ImportAttributes, Loader, Resolver};
use rquickjs::module::{Declared, ModuleLoadFn};
use rquickjs::{Ctx, Module};

use crate::error::LoaderError;
use crate::modules::registry::ModuleRegistry;

/// The loader kind a normalized specifier dispatches to.
#[derive(Debug, PartialEq, Eq)]
pub enum Kind {
    /// `@...` — looked up in the [`ModuleRegistry`].
    Bytecode,
    /// `....so` — a native shared object, loaded via `libloading`.
    Native,
    /// `....js` / `....mjs` — engine source, compiled as a module.
    Source,
    /// `....json` — wrapped as `export default JSON.parse(...)` then loaded
    /// as source.
    Json,
}

/// Classifies a normalized specifier by its trailing extension.
pub fn classify(name: &str) -> Kind {
    if name.starts_with('@') {
        Kind::Bytecode
    } else if name.ends_with(".so") {
        Kind::Native
    } else if name.ends_with(".json") {
        Kind::Json
    } else {
        Kind::Source
    }
}

/// No recognized extension → append `.js` and retry as source, per spec.md
/// §4.2. Leaves names that already end in a recognized extension alone.
fn source_path(name: &str) -> String {
    if name.ends_with(".js") || name.ends_with(".mjs") {
        name.to_string()
    } else {
        format!("{name}.js")
    }
}

/// Resolves `requested` against `base`, per spec.md §4.2.
///
/// Internal (`@`-prefixed) names outside bootstrap are checked against the
/// whitelist and rejected with a [`LoaderError`] if found there — they are
/// constructor-injected, never directly importable. Absolute engine
/// specifiers (anything not starting with `.`) pass through verbatim.
/// Relative specifiers are resolved against `base`'s directory, collapsing
/// `.`/`..` segments; an empty intermediate segment aborts normalization.
pub fn normalize(base: &str, requested: &str, in_bootstrap: bool) -> Result<String, LoaderError> {
    if requested.starts_with('@') {
        if !in_bootstrap && ModuleRegistry::is_rejected_internal(requested) {
            return Err(LoaderError {
                name: requested.to_string(),
            });
        }
        return Ok(requested.to_string());
    }

    if !requested.starts_with('.') {
        return Ok(requested.to_string());
    }

    let base_dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    let joined = base_dir.join(requested);

    let joined_lossy = joined.to_string_lossy();
    let mut collapsed: Vec<&str> = Vec::new();
    for segment in joined_lossy.split('/') {
        match segment {
            "" => continue,
            "." => continue,
            ".." => {
                if collapsed.pop().is_none() {
                    return Err(LoaderError {
                        name: requested.to_string(),
                    });
                }
            }
            other => collapsed.push(other),
        }
    }
    if collapsed.is_empty() {
        return Err(LoaderError {
            name: requested.to_string(),
        });
    }
    Ok(collapsed.join("/"))
}

/// `rquickjs::loader::Resolver` wiring [`normalize`] into module resolution.
pub struct CoreResolver {
    in_bootstrap: Arc<Mutex<bool>>,
}

impl CoreResolver {
    /// Builds a resolver sharing the given bootstrap flag with [`CoreLoader`].
    pub fn new(in_bootstrap: Arc<Mutex<bool>>) -> Self {
        Self { in_bootstrap }
    }
}

impl Resolver for CoreResolver {
    fn resolve<'js>(
        &mut self,
        _ctx: &Ctx<'js>,
        base: &str,
        name: &str,
        _attributes: Option<ImportAttributes<'js>>,
    ) -> rquickjs::Result<String> {
        let in_bootstrap = *self.in_bootstrap.lock().unwrap();
        normalize(base, name, in_bootstrap)
            .map_err(|e| rquickjs::Error::new_resolving_message(base, name, e.to_string()))
    }
}

/// `rquickjs::loader::Loader` wiring registry/source/JSON/native dispatch
/// into module loading.
pub struct CoreLoader {
    registry: ModuleRegistry,
    /// Keeps every `.so` opened by this loader alive for the runtime's
    /// lifetime — the JS module it exports stays valid only as long as its
    /// backing library isn't unloaded.
    native_libs: Vec<libloading::Library>,
}

impl CoreLoader {
    /// Builds a loader over the given (already populated) registry.
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            native_libs: Vec::new(),
        }
    }
}

impl Loader for CoreLoader {
    fn load<'js>(
        &mut self,
        ctx: &Ctx<'js>,
        name: &str,
        _attributes: Option<ImportAttributes<'js>>,
    ) -> rquickjs::Result<Module<'js, Declared>> {
        match classify(name) {
            Kind::Bytecode => {
                let bytes = self.registry.lookup(name).ok_or_else(|| {
                    rquickjs::Error::new_loading(name)
                })?;
                unsafe { Module::load(ctx.clone(), &bytes) }
            }
            Kind::Json => {
                let source = std::fs::read_to_string(name)
                    .map_err(|_| rquickjs::Error::new_loading(name))?;
                let wrapped = format!("export default JSON.parse(`{source}`);");
                Module::declare(ctx.clone(), name.to_string(), wrapped)
            }
            Kind::Source => {
                let path = source_path(name);
                let source = std::fs::read_to_string(&path)
                    .map_err(|_| rquickjs::Error::new_loading(name))?;
                Module::declare(ctx.clone(), path, source)
            }
            Kind::Native => {
                let lib = open_native(name)
                    .map_err(|e| rquickjs::Error::new_loading_message(name, e.to_string()))?;
                let init: libloading::Symbol<ModuleLoadFn> = unsafe { lib.get(b"js_init_module\0") }
                    .map_err(|_| {
                        rquickjs::Error::new_loading_message(name, "missing symbol `js_init_module`")
                    })?;
                let load_fn: ModuleLoadFn = *init;
                let module = unsafe { Module::from_load_fn(ctx.clone(), name.to_string(), load_fn)? };
                self.native_libs.push(lib);
                Ok(module)
            }
        }
    }
}

/// Opens a shared object with `RTLD_NOW|RTLD_LOCAL`, per spec.md §4.2 —
/// resolved at call, and local to this library so it can't shadow symbols
/// in other natively-loaded modules.
#[cfg(unix)]
fn open_native(path: &str) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    let lib = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }?;
    Ok(libloading::Library::from(lib))
}

#[cfg(not(unix))]
fn open_native(path: &str) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_specifier_resolves_against_base_directory() {
        let resolved = normalize("/app/main.js", "./util.js", false).unwrap();
        assert_eq!(resolved, "app/util.js");
    }

    #[test]
    fn parent_segment_collapses_one_level() {
        let resolved = normalize("/app/sub/main.js", "../util.js", false).unwrap();
        assert_eq!(resolved, "app/util.js");
    }

    #[test]
    fn absolute_specifier_passes_through_verbatim() {
        assert_eq!(normalize("/app/main.js", "node:fs", false).unwrap(), "node:fs");
    }

    #[test]
    fn whitelisted_internal_name_rejected_outside_bootstrap() {
        assert!(normalize("/app/main.js", "@tjs/bootstrap", false).is_err());
    }

    #[test]
    fn whitelisted_internal_name_allowed_inside_bootstrap() {
        assert_eq!(
            normalize("/app/main.js", "@tjs/bootstrap", true).unwrap(),
            "@tjs/bootstrap"
        );
    }

    #[test]
    fn excess_parent_segments_abort_normalization() {
        assert!(normalize("a.js", "../../escape.js", false).is_err());
    }

    #[test]
    fn classify_dispatches_by_extension() {
        assert_eq!(classify("@tjs/fs"), Kind::Bytecode);
        assert_eq!(classify("native.so"), Kind::Native);
        assert_eq!(classify("data.json"), Kind::Json);
        assert_eq!(classify("main.js"), Kind::Source);
        assert_eq!(classify("main.mjs"), Kind::Source);
    }

    #[test]
    fn extensionless_specifier_is_classified_as_source() {
        assert_eq!(classify("util"), Kind::Source);
    }

    #[test]
    fn source_path_appends_js_to_an_extensionless_name() {
        assert_eq!(source_path("util"), "util.js");
    }

    #[test]
    fn source_path_leaves_recognized_extensions_alone() {
        assert_eq!(source_path("main.js"), "main.js");
        assert_eq!(source_path("main.mjs"), "main.mjs");
    }

    #[test]
    fn missing_shared_object_fails_to_open() {
        assert!(open_native("/no/such/module.so").is_err());
    }
}
