use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::errors::LoadError;
use crate::domain::entities::ModuleKind;

/// File-system capability used for module discovery
pub trait FileSystem: Send + Sync {
    /// Entries of `dir`, in a stable order
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn is_dir(&self, path: &Path) -> bool;
}

/// Turns a file into a module instance.
///
/// Sources may cache what they parse; `unload` must evict the entry for
/// `path` so the next `load` sees the file as it is on disk.
pub trait ModuleSource<M: ?Sized>: Send + Sync {
    /// `Ok(None)` when the file holds no module of kind `expected`.
    fn load(&self, path: &Path, expected: ModuleKind) -> Result<Option<Arc<M>>, LoadError>;

    fn unload(&self, path: &Path);
}
