use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

use super::HookSource;

/// Seam for `Builder::with_hooks_file`. There is no dynamic module loader
/// in a statically compiled Rust binary, so the crate defines only this
/// trait; the caller supplies an implementation (e.g. one that resolves a
/// plugin `.so`/`.dll` via `libloading`, or a static registry keyed by
/// path).
pub trait HookModuleLoader: Send + Sync {
    /// Loads the hook source exported as `export_name` from the module at
    /// `path`. The loaded entity may define any subset of `setup`,
    /// `cleanup`, and `{event}${camelName}` methods; its constructor
    /// receives a single argument object containing at least a `debug`
    /// callable, with additional fields ignored.
    fn load(&self, path: &Path, export_name: &str) -> Result<Arc<dyn HookSource>>;
}
