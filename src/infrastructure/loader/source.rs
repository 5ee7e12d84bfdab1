//! Manifest source - builds modules from YAML manifests through named factories

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

use super::manifest::ModuleManifest;
use crate::application::errors::LoadError;
use crate::domain::entities::ModuleKind;
use crate::domain::traits::ModuleSource;

/// Builds a module from its manifest
pub type Factory<M> = Arc<dyn Fn(&ModuleManifest) -> Result<Arc<M>, LoadError> + Send + Sync>;

/// [`ModuleSource`] over manifest files.
///
/// Parsed manifests are cached per path until `unload` evicts them, so a
/// reload always re-reads the file.
pub struct ManifestSource<M: ?Sized> {
    factories: RwLock<HashMap<String, Factory<M>>>,
    cache: Mutex<HashMap<PathBuf, ModuleManifest>>,
}

impl<M: ?Sized> ManifestSource<M> {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleManifest) -> Result<Arc<M>, LoadError> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(factory));
    }

    pub fn with_factory<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleManifest) -> Result<Arc<M>, LoadError> + Send + Sync + 'static,
    {
        self.register_factory(name, factory);
        self
    }

    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Parsed manifest for `path`, from the cache when present
    pub fn manifest(&self, path: &Path) -> Result<ModuleManifest, LoadError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(manifest) = cache.get(path) {
            return Ok(manifest.clone());
        }
        let manifest = ModuleManifest::from_file(path)?;
        cache.insert(path.to_path_buf(), manifest.clone());
        Ok(manifest)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

impl<M: ?Sized> Default for ManifestSource<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ?Sized> ModuleSource<M> for ManifestSource<M> {
    fn load(&self, path: &Path, expected: ModuleKind) -> Result<Option<Arc<M>>, LoadError> {
        let manifest = self.manifest(path)?;
        if manifest.kind != expected {
            debug!("{} declares a {}, expected {}", path.display(), manifest.kind, expected);
            return Ok(None);
        }

        let name = manifest.factory_name();
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::UnknownFactory(name.to_string()))?;
        factory(&manifest).map(Some)
    }

    fn unload(&self, path: &Path) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Command, CommandOptions};
    use async_trait::async_trait;

    struct Named(CommandOptions);

    #[async_trait]
    impl Command for Named {
        fn options(&self) -> &CommandOptions {
            &self.0
        }
    }

    fn source() -> ManifestSource<dyn Command> {
        ManifestSource::new().with_factory("named", |manifest: &ModuleManifest| {
            Ok(Arc::new(Named(manifest.command_options()?)) as Arc<dyn Command>)
        })
    }

    #[test]
    fn test_builds_through_factory_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping.yaml");
        std::fs::write(&path, "kind: command\nid: ping\nfactory: named\nname: ping\n").unwrap();
        let source = source();

        let command = source.load(&path, ModuleKind::Command).unwrap().unwrap();
        assert_eq!(command.options().name, "ping");
        assert!(source.is_cached(&path));

        std::fs::write(&path, "kind: command\nid: ping\nfactory: named\nname: pong\n").unwrap();
        let cached = source.load(&path, ModuleKind::Command).unwrap().unwrap();
        assert_eq!(cached.options().name, "ping");

        source.unload(&path);
        let fresh = source.load(&path, ModuleKind::Command).unwrap().unwrap();
        assert_eq!(fresh.options().name, "pong");
    }

    #[test]
    fn test_kind_mismatch_and_unknown_factory() {
        let dir = tempfile::tempdir().unwrap();
        let listener = dir.path().join("ready.yaml");
        std::fs::write(&listener, "kind: listener\nid: ready\nevent: ready\n").unwrap();
        let orphan = dir.path().join("orphan.yaml");
        std::fs::write(&orphan, "kind: command\nid: orphan\nname: orphan\n").unwrap();
        let source = source();

        assert!(source.load(&listener, ModuleKind::Command).unwrap().is_none());
        assert!(matches!(
            source.load(&orphan, ModuleKind::Command),
            Err(LoadError::UnknownFactory(ref name)) if name == "orphan"
        ));
    }
}
