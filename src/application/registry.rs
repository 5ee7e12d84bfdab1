//! Module registry - discovers, loads, indexes and retires modules
//!
//! [`ModuleHandler`] is generic over the module capability it manages
//! (`dyn Command`, `dyn Inhibitor`, `dyn Listener`). Specialised handlers
//! plug extra registration behaviour in through [`RegistryHooks`].

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info, warn};

use crate::application::errors::{HandlerError, HandlerResult, LoadError};
use crate::application::events::{EventBus, HandlerEvent};
use crate::domain::entities::{Category, Module, ModuleInfo, ModuleKind, DEFAULT_CATEGORY};
use crate::domain::traits::{FileSystem, ModuleSource};
use crate::infrastructure::loader::LocalFs;

/// Stem suffix of declaration-only files, e.g. `shared.d.yaml`
const DECLARATION_SUFFIX: &str = ".d";

pub type LoadFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct HandlerOptions {
    pub directory: PathBuf,
    /// Accepted file extensions, without the leading dot
    pub extensions: HashSet<String>,
    /// Derive category ids from the parent directory for modules in the
    /// default category
    pub automate_categories: bool,
    pub class_to_handle: ModuleKind,
    pub load_filter: LoadFilter,
}

impl HandlerOptions {
    pub fn new(class_to_handle: ModuleKind) -> Self {
        Self {
            directory: PathBuf::from("."),
            extensions: ["yaml", "yml"].into_iter().map(String::from).collect(),
            automate_categories: false,
            class_to_handle,
            load_filter: Arc::new(|_| true),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn with_automate_categories(mut self, enabled: bool) -> Self {
        self.automate_categories = enabled;
        self
    }

    pub fn with_load_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.load_filter = Arc::new(filter);
        self
    }
}

/// Extension points for specialised handlers.
///
/// All hooks run while the registry holds its write lock, so they must not
/// call back into the registry.
pub trait RegistryHooks<M: ?Sized + Module>: Send + Sync {
    /// Scoped identity collision beyond the plain id, checked by `load`.
    fn conflicts(&self, _module: &M) -> bool {
        false
    }

    /// Error reported when `register` meets an id that is already taken.
    fn duplicate(&self, module: &M) -> HandlerError {
        HandlerError::AlreadyLoaded {
            kind: module.kind(),
            id: module.id().to_string(),
        }
    }

    /// Runs before the module becomes visible. An error aborts registration.
    fn on_register(&self, _module: &Arc<M>) -> HandlerResult<()> {
        Ok(())
    }

    /// Reverses `on_register`. An error aborts deregistration.
    fn on_deregister(&self, _module: &Arc<M>) -> HandlerResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing
pub struct NoHooks;

impl<M: ?Sized + Module> RegistryHooks<M> for NoHooks {}

/// A module as registered: instance, origin and category.
pub struct LoadedModule<M: ?Sized + Module + 'static> {
    module: Arc<M>,
    file_path: Option<PathBuf>,
    category_id: String,
    handler: Weak<Inner<M>>,
}

impl<M: ?Sized + Module + 'static> LoadedModule<M> {
    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    pub fn id(&self) -> &str {
        self.module.id()
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    /// Set only for modules loaded from disk
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            kind: self.module.kind(),
            id: self.id().to_string(),
            category: self.category_id.clone(),
            file_path: self.file_path.clone(),
        }
    }

    pub fn handler(&self) -> Option<ModuleHandler<M>> {
        self.handler.upgrade().map(|inner| ModuleHandler { inner })
    }

    pub fn category(&self) -> Option<Category> {
        self.handler()?.category(&self.category_id)
    }

    pub fn reload(&self) -> HandlerResult<Option<Arc<LoadedModule<M>>>> {
        self.owner()?.reload(self.id())
    }

    pub fn remove(&self) -> HandlerResult<Arc<LoadedModule<M>>> {
        self.owner()?.remove(self.id())
    }

    fn owner(&self) -> HandlerResult<ModuleHandler<M>> {
        self.handler().ok_or_else(|| HandlerError::ModuleNotFound {
            kind: self.module.kind(),
            id: self.id().to_string(),
        })
    }
}

impl<M: ?Sized + Module + 'static> fmt::Debug for LoadedModule<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id())
            .field("category", &self.category_id)
            .field("file_path", &self.file_path)
            .finish()
    }
}

impl<M: ?Sized + Module + 'static> Deref for LoadedModule<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}

struct State<M: ?Sized + Module + 'static> {
    modules: IndexMap<String, Arc<LoadedModule<M>>>,
    categories: IndexMap<String, Category>,
}

struct Inner<M: ?Sized + Module + 'static> {
    options: HandlerOptions,
    source: Arc<dyn ModuleSource<M>>,
    fs: Arc<dyn FileSystem>,
    hooks: Arc<dyn RegistryHooks<M>>,
    events: EventBus,
    state: RwLock<State<M>>,
    loaded: AtomicBool,
}

impl<M: ?Sized + Module + 'static> Inner<M> {
    fn state(&self) -> RwLockReadGuard<'_, State<M>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, State<M>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        if !self.options.extensions.contains(ext) {
            return false;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        !stem.ends_with(DECLARATION_SUFFIX)
    }
}

/// Generic module registry and loader
pub struct ModuleHandler<M: ?Sized + Module + 'static> {
    inner: Arc<Inner<M>>,
}

impl<M: ?Sized + Module + 'static> Clone for ModuleHandler<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ?Sized + Module + 'static> ModuleHandler<M> {
    pub fn new(options: HandlerOptions, source: Arc<dyn ModuleSource<M>>) -> Self {
        Self::with_parts(options, source, Arc::new(LocalFs), Arc::new(NoHooks))
    }

    pub fn with_parts(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<M>>,
        fs: Arc<dyn FileSystem>,
        hooks: Arc<dyn RegistryHooks<M>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                source,
                fs,
                hooks,
                events: EventBus::new(),
                state: RwLock::new(State {
                    modules: IndexMap::new(),
                    categories: IndexMap::new(),
                }),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.inner.options
    }

    pub fn kind(&self) -> ModuleKind {
        self.inner.options.class_to_handle
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Whether `load_all` has completed at least once
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::Acquire)
    }

    /// Recursively lists every regular file under `directory`, depth-first.
    pub fn discover(&self, directory: &Path) -> HandlerResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        self.discover_into(directory, &mut files)?;
        Ok(files)
    }

    fn discover_into(&self, dir: &Path, files: &mut Vec<PathBuf>) -> HandlerResult<()> {
        let entries = self.inner.fs.read_dir(dir).map_err(|source| HandlerError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for path in entries {
            if self.inner.fs.is_dir(&path) {
                self.discover_into(&path, files)?;
            } else {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Loads one file.
    ///
    /// Files with a foreign extension, declaration-only files and files that
    /// hold no module of the expected kind yield `Ok(None)`. A module that
    /// fails construction is an error.
    pub fn load(&self, path: impl AsRef<Path>, is_reload: bool) -> HandlerResult<Option<Arc<LoadedModule<M>>>> {
        let path = path.as_ref();
        let inner = &self.inner;
        if !inner.accepts(path) {
            return Ok(None);
        }

        let expected = inner.options.class_to_handle;
        let module = match inner.source.load(path, expected) {
            Ok(Some(module)) if module.kind() == expected => module,
            Ok(_) => {
                debug!("No {} in {}", expected, path.display());
                inner.source.unload(path);
                return Ok(None);
            }
            Err(LoadError::Invalid(e)) => {
                inner.source.unload(path);
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                inner.source.unload(path);
                return Ok(None);
            }
        };

        if self.contains(module.id()) || inner.hooks.conflicts(&module) {
            if !self.owns_path(path) {
                inner.source.unload(path);
            }
            return Err(HandlerError::AlreadyLoaded {
                kind: expected,
                id: module.id().to_string(),
            });
        }

        let entry = self.register(module, Some(path.to_path_buf()))?;
        info!(
            "{} {} '{}' [{}]",
            if is_reload { "Reloaded" } else { "Loaded" },
            expected,
            entry.id(),
            entry.category_id()
        );
        inner.events.emit(HandlerEvent::Load {
            module: entry.info(),
            is_reload,
        });
        Ok(Some(entry))
    }

    /// Registers a module. Modules without a file path cannot be reloaded
    /// and are skipped by bulk reload/remove.
    pub fn register(&self, module: Arc<M>, file_path: Option<PathBuf>) -> HandlerResult<Arc<LoadedModule<M>>> {
        let inner = &self.inner;
        let mut category_id = module.category_id().to_string();
        if category_id == DEFAULT_CATEGORY && inner.options.automate_categories {
            if let Some(dir) = file_path
                .as_deref()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
            {
                category_id = dir.to_string();
            }
        }

        let entry = Arc::new(LoadedModule {
            module: Arc::clone(&module),
            file_path,
            category_id: category_id.clone(),
            handler: Arc::downgrade(inner),
        });

        let mut state = inner.state_mut();
        if state.modules.contains_key(module.id()) {
            return Err(inner.hooks.duplicate(&module));
        }
        inner.hooks.on_register(&module)?;

        let id = module.id().to_string();
        state.modules.insert(id.clone(), Arc::clone(&entry));
        state
            .categories
            .entry(category_id.clone())
            .or_insert_with(|| Category::new(category_id))
            .insert(id);
        Ok(entry)
    }

    /// Removes a module from both indexes and evicts its file from the
    /// source. `entry` must be the currently registered instance.
    pub fn deregister(&self, entry: &Arc<LoadedModule<M>>) -> HandlerResult<()> {
        let inner = &self.inner;
        let mut state = inner.state_mut();
        let current = state
            .modules
            .get(entry.id())
            .is_some_and(|registered| Arc::ptr_eq(registered, entry));
        if !current {
            return Err(HandlerError::ModuleNotFound {
                kind: self.kind(),
                id: entry.id().to_string(),
            });
        }

        inner.hooks.on_deregister(&entry.module)?;
        if let Some(path) = &entry.file_path {
            inner.source.unload(path);
        }
        state.modules.shift_remove(entry.id());
        if let Some(category) = state.categories.get_mut(&entry.category_id) {
            category.remove(entry.id());
        }
        Ok(())
    }

    /// Loads every file under the configured directory that passes the
    /// configured filter.
    pub fn load_all(&self) -> HandlerResult<()> {
        let directory = self.inner.options.directory.clone();
        let filter = Arc::clone(&self.inner.options.load_filter);
        self.load_all_from(&directory, filter.as_ref())
    }

    pub fn load_all_from(&self, directory: &Path, filter: &(dyn Fn(&Path) -> bool + Send + Sync)) -> HandlerResult<()> {
        if !self.inner.fs.is_dir(directory) {
            warn!("{} directory does not exist: {}", self.kind(), directory.display());
            self.inner.loaded.store(true, Ordering::Release);
            return Ok(());
        }
        for path in self.discover(directory)? {
            let path = std::path::absolute(&path).unwrap_or(path);
            if filter(&path) {
                self.load(&path, false)?;
            }
        }
        self.inner.loaded.store(true, Ordering::Release);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> HandlerResult<Arc<LoadedModule<M>>> {
        let entry = self.get(id).ok_or_else(|| HandlerError::ModuleNotFound {
            kind: self.kind(),
            id: id.to_string(),
        })?;
        self.deregister(&entry)?;
        info!("Removed {} '{}'", self.kind(), id);
        self.inner.events.emit(HandlerEvent::Remove { module: entry.info() });
        Ok(entry)
    }

    /// Removes every module that was loaded from disk
    pub fn remove_all(&self) -> HandlerResult<()> {
        for id in self.file_backed_ids(None) {
            self.remove(&id)?;
        }
        Ok(())
    }

    /// Replaces a disk-loaded module with a fresh load of the same file
    pub fn reload(&self, id: &str) -> HandlerResult<Option<Arc<LoadedModule<M>>>> {
        let entry = self.get(id).ok_or_else(|| HandlerError::ModuleNotFound {
            kind: self.kind(),
            id: id.to_string(),
        })?;
        let Some(path) = entry.file_path.clone() else {
            return Err(HandlerError::NotReloadable {
                kind: self.kind(),
                id: id.to_string(),
            });
        };
        self.deregister(&entry)?;
        self.load(&path, true)
    }

    pub fn reload_all(&self) -> HandlerResult<()> {
        for id in self.file_backed_ids(None) {
            self.reload(&id)?;
        }
        Ok(())
    }

    /// Reloads the disk-loaded members of one category
    pub fn reload_category(&self, category_id: &str) -> HandlerResult<()> {
        for id in self.file_backed_ids(Some(category_id)) {
            self.reload(&id)?;
        }
        Ok(())
    }

    /// Removes the disk-loaded members of one category
    pub fn remove_category(&self, category_id: &str) -> HandlerResult<()> {
        for id in self.file_backed_ids(Some(category_id)) {
            self.remove(&id)?;
        }
        Ok(())
    }

    // Snapshot: reload and remove mutate the index while we iterate.
    fn file_backed_ids(&self, category_id: Option<&str>) -> Vec<String> {
        self.inner
            .state()
            .modules
            .values()
            .filter(|m| m.file_path.is_some())
            .filter(|m| category_id.map_or(true, |c| m.category_id == c))
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Case-insensitive category lookup
    pub fn find_category(&self, name: &str) -> Option<Category> {
        self.inner
            .state()
            .categories
            .values()
            .find(|c| c.id().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn category(&self, id: &str) -> Option<Category> {
        self.inner.state().categories.get(id).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.inner.state().categories.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<LoadedModule<M>>> {
        self.inner.state().modules.get(id).cloned()
    }

    fn owns_path(&self, path: &Path) -> bool {
        self.inner
            .state()
            .modules
            .values()
            .any(|m| m.file_path.as_deref() == Some(path))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.state().modules.contains_key(id)
    }

    /// Registered modules in registration order
    pub fn modules(&self) -> Vec<Arc<LoadedModule<M>>> {
        self.inner.state().modules.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.state().modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().modules.is_empty()
    }

    /// Checks that the module index and the category members correspond 1:1.
    pub fn check_consistency(&self) -> bool {
        let state = self.inner.state();
        let members: usize = state.categories.values().map(Category::len).sum();
        members == state.modules.len()
            && state.modules.values().all(|m| {
                state
                    .categories
                    .get(&m.category_id)
                    .is_some_and(|c| c.contains(m.id()))
            })
    }
}
