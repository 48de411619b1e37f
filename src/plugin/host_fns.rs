//! Host capabilities reachable from the focused plugin.
//!
//! A capability namespace implements [`ConfigCapability`]; the three trait methods are the
//! entire surface a plugin can reach. Every call gets a one-shot [`Completion`] which may be
//! fired synchronously or later from another thread.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;

use serde_json::Value;
use thiserror::Error;

use crate::msg::Msg;
use crate::plugin::broker::CallKey;
use crate::plugin::manifest::PluginId;
use crate::plugin::permission::Operation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("unknown capability namespace: {0:?}")]
    UnknownNamespace(String),
    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments {
        operation: &'static str,
        reason: String,
    },
    #[error("invalid config path: {0}")]
    InvalidPath(String),
    #[error("config not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("capability namespace must not be empty")]
    EmptyNamespace,
    #[error("capability namespace already registered: {0}")]
    DuplicateNamespace(String),
}

pub type CapabilityResult = Result<Value, CapabilityError>;

/// One-shot handle that routes a capability result back into the session loop.
///
/// Dropping it without calling [`Completion::complete`] reports the call as abandoned, so the
/// broker can release its pending entry.
#[derive(Debug)]
pub struct Completion {
    key: CallKey,
    tx: mpsc::Sender<Msg>,
    fired: bool,
}

impl Completion {
    pub fn new(key: CallKey, tx: mpsc::Sender<Msg>) -> Self {
        Self {
            key,
            tx,
            fired: false,
        }
    }

    pub fn key(&self) -> CallKey {
        self.key
    }

    pub fn complete(mut self, outcome: CapabilityResult) {
        self.fired = true;
        if self
            .tx
            .send(Msg::CapabilityCompleted(self.key, outcome))
            .is_err()
        {
            tracing::debug!("session closed before capability completed");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.fired {
            // Session may already be gone; nothing left to release then.
            let _ = self.tx.send(Msg::CapabilityAbandoned(self.key));
        }
    }
}

/// Typed form of an allowed call, decoded from the wire arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCall {
    Set { path: String, content: String },
    Get { path: String },
    Remove { path: String },
}

impl ConfigCall {
    pub fn from_arguments(operation: Operation, args: &[Value]) -> Result<Self, CapabilityError> {
        let invalid = |reason: String| CapabilityError::InvalidArguments {
            operation: operation.name(),
            reason,
        };
        let string_at = |idx: usize| -> Result<String, CapabilityError> {
            match args.get(idx) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Err(invalid(format!(
                    "argument {idx} must be a string, got {other}"
                ))),
                None => Err(invalid(format!("missing argument {idx}"))),
            }
        };
        let expect_len = |len: usize| -> Result<(), CapabilityError> {
            if args.len() == len {
                Ok(())
            } else {
                Err(invalid(format!("expected {len} arguments, got {}", args.len())))
            }
        };

        match operation {
            Operation::SetConfig => {
                expect_len(2)?;
                Ok(ConfigCall::Set {
                    path: string_at(0)?,
                    content: string_at(1)?,
                })
            }
            Operation::GetConfig => {
                expect_len(1)?;
                Ok(ConfigCall::Get { path: string_at(0)? })
            }
            Operation::RemoveConfig => {
                expect_len(1)?;
                Ok(ConfigCall::Remove { path: string_at(0)? })
            }
        }
    }
}

/// A capability namespace. Implementations are namespaced per plugin through `plugin`.
pub trait ConfigCapability {
    fn set_config(&mut self, plugin: &PluginId, path: &str, content: &str, done: Completion);
    fn get_config(&mut self, plugin: &PluginId, path: &str, done: Completion);
    fn remove_config(&mut self, plugin: &PluginId, path: &str, done: Completion);
}

#[derive(Default)]
pub struct CapabilityTable {
    namespaces: HashMap<String, Box<dyn ConfigCapability>>,
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.namespaces.keys().collect();
        names.sort();
        f.debug_struct("CapabilityTable")
            .field("namespaces", &names)
            .finish()
    }
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        namespace: impl Into<String>,
        capability: Box<dyn ConfigCapability>,
    ) -> Result<(), RegistrationError> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(RegistrationError::EmptyNamespace);
        }
        if self.namespaces.contains_key(&namespace) {
            return Err(RegistrationError::DuplicateNamespace(namespace));
        }

        tracing::info!("capability namespace {namespace} registered");
        self.namespaces.insert(namespace, capability);
        Ok(())
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn dispatch(
        &mut self,
        namespace: &str,
        plugin: &PluginId,
        call: ConfigCall,
        done: Completion,
    ) {
        let Some(capability) = self.namespaces.get_mut(namespace) else {
            done.complete(Err(CapabilityError::UnknownNamespace(namespace.to_string())));
            return;
        };

        match call {
            ConfigCall::Set { path, content } => {
                capability.set_config(plugin, &path, &content, done)
            }
            ConfigCall::Get { path } => capability.get_config(plugin, &path, done),
            ConfigCall::Remove { path } => capability.remove_config(plugin, &path, done),
        }
    }
}

/// Config files on disk, one directory per plugin under `root`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    root: PathBuf,
}

impl FileConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, plugin: &PluginId, path: &str) -> Result<PathBuf, CapabilityError> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            return Err(CapabilityError::InvalidPath("empty path".to_string()));
        }
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(CapabilityError::InvalidPath(path.to_string()));
        }

        Ok(self.root.join(plugin_dir_name(plugin)).join(relative))
    }

    fn write(&self, plugin: &PluginId, path: &str, content: &str) -> CapabilityResult {
        let target = self.resolve(plugin, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&target, content).map_err(io_error)?;
        Ok(Value::Null)
    }

    fn read(&self, plugin: &PluginId, path: &str) -> CapabilityResult {
        let target = self.resolve(plugin, path)?;
        match fs::read_to_string(&target) {
            Ok(content) => Ok(Value::String(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(CapabilityError::NotFound(path.to_string()))
            }
            Err(err) => Err(io_error(err)),
        }
    }

    fn remove(&self, plugin: &PluginId, path: &str) -> CapabilityResult {
        let target = self.resolve(plugin, path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(Value::Null),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(CapabilityError::NotFound(path.to_string()))
            }
            Err(err) => Err(io_error(err)),
        }
    }
}

impl ConfigCapability for FileConfigStore {
    fn set_config(&mut self, plugin: &PluginId, path: &str, content: &str, done: Completion) {
        done.complete(self.write(plugin, path, content));
    }

    fn get_config(&mut self, plugin: &PluginId, path: &str, done: Completion) {
        done.complete(self.read(plugin, path));
    }

    fn remove_config(&mut self, plugin: &PluginId, path: &str, done: Completion) {
        done.complete(self.remove(plugin, path));
    }
}

fn io_error(err: io::Error) -> CapabilityError {
    CapabilityError::Io(err.to_string())
}

/// Directory name for a plugin's config files. Distinct ids always get distinct names, also
/// on case-insensitive filesystems.
///
/// The id is percent-encoded, then each upper-case letter outside an escape becomes `^` plus
/// its lower-case form (`^` itself is always percent-encoded). The names `""`, `.` and `..`
/// are written as escapes, which encoding alone never produces for them.
fn plugin_dir_name(plugin: &PluginId) -> String {
    match plugin.as_str() {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let encoded = urlencoding::encode(plugin.as_str());
    let mut name = String::with_capacity(encoded.len());
    let mut escape_digits = 0;
    for ch in encoded.chars() {
        if escape_digits > 0 {
            escape_digits -= 1;
            name.push(ch);
        } else if ch == '%' {
            escape_digits = 2;
            name.push(ch);
        } else if ch.is_ascii_uppercase() {
            name.push('^');
            name.push(ch.to_ascii_lowercase());
        } else {
            name.push(ch);
        }
    }
    name
}
