//! Application layer errors

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::entities::ModuleKind;

/// Registry and handler errors.
///
/// These are raised synchronously at the point of violation and are never
/// swallowed by the registry layer.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{kind} '{id}' does not exist")]
    ModuleNotFound { kind: ModuleKind, id: String },

    #[error("{kind} '{id}' is already loaded")]
    AlreadyLoaded { kind: ModuleKind, id: String },

    #[error("{kind} '{id}' is not reloadable")]
    NotReloadable { kind: ModuleKind, id: String },

    #[error("Alias '{alias}' of '{id}' already exists on '{conflict}'")]
    AliasConflict {
        alias: String,
        id: String,
        conflict: String,
    },

    #[error("Class to handle {given} is not a {expected}")]
    InvalidClassToHandle {
        given: ModuleKind,
        expected: ModuleKind,
    },

    #[error("Value of '{name}' was not a valid {expected}")]
    InvalidType { name: String, expected: String },

    #[error("{module}#{method} has not been implemented")]
    NotImplemented { module: String, method: String },

    #[error("{kind} '{id}' has no {field}")]
    MissingName {
        kind: ModuleKind,
        id: String,
        field: &'static str,
    },

    #[error("{0} handler has not finished loading")]
    NotLoaded(ModuleKind),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by user-supplied code: command bodies, inhibitor
/// predicates, permission functions and listeners.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{module}#{method} has not been implemented")]
    NotImplemented { module: String, method: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl CommandError {
    pub fn not_implemented(module: impl Into<String>, method: impl Into<String>) -> Self {
        CommandError::NotImplemented {
            module: module.into(),
            method: method.into(),
        }
    }
}

/// Errors from a module source. The registry treats these as
/// "nothing to load", except `Invalid`, which it returns to the caller.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    #[error("Unknown factory '{0}'")]
    UnknownFactory(String),

    #[error("Invalid module: {0}")]
    Invalid(#[from] HandlerError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type HandlerResult<T> = Result<T, HandlerError>;
