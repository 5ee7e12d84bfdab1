//! Module identity shared by commands, inhibitors and listeners

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Category id assigned to modules that do not name one.
pub const DEFAULT_CATEGORY: &str = "default";

/// Capability marker checked when a module is loaded or registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Command,
    Inhibitor,
    Listener,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Command => "Command",
            ModuleKind::Inhibitor => "Inhibitor",
            ModuleKind::Listener => "Listener",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded, identity-bearing unit of pluggable behavior.
pub trait Module: Send + Sync {
    /// Identifier, unique within a registry.
    fn id(&self) -> &str;

    /// Category id the module asks for. `DEFAULT_CATEGORY` lets the registry
    /// derive one from the file location.
    fn category_id(&self) -> &str;

    fn kind(&self) -> ModuleKind;
}

/// Snapshot of a registered module, carried by load/remove events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub kind: ModuleKind,
    pub id: String,
    pub category: String,
    pub file_path: Option<PathBuf>,
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' [{}]", self.kind, self.id, self.category)
    }
}
