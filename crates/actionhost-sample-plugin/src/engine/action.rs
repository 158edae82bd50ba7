//! Actions and their identities.

use std::hash::{Hash, Hasher};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use actionhost_plugin_sdk::{ActionHandle, PluginError, Result};
use parking_lot::RwLock;

/// 64-bit action identity. Never `0`.
pub type ActionId = u64;

/// Longest serialized identity: 16 hexadecimal digits.
pub const MAX_SERIALIZED_LEN: u64 = 16;

/// Mutable metadata of an action. Never part of its identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionInfo {
    pub name: String,
    pub description: String,
}

impl ActionInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// An action owned by the registry. Compared and hashed by id only.
#[derive(Debug)]
pub struct Action {
    id: ActionId,
    info: RwLock<ActionInfo>,
}

impl Action {
    pub fn new(id: ActionId, info: ActionInfo) -> Self {
        Self {
            id,
            info: RwLock::new(info),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Snapshot of the current metadata.
    pub fn info(&self) -> ActionInfo {
        self.info.read().clone()
    }

    pub fn set_info(&self, info: ActionInfo) {
        *self.info.write() = info;
    }

    /// Classify `value` and write the outcome to `out`.
    ///
    /// Negative values fail with an execution error.
    pub fn execute(&self, value: i32, out: &mut dyn Write) -> Result<()> {
        match value {
            v if v > 0 => writeln!(out, "positive value {v}")?,
            0 => writeln!(out, "zero 0")?,
            _ => {
                return Err(PluginError::Execution(format!(
                    "execution error of action {}",
                    self.id
                )))
            }
        }
        out.flush()?;
        Ok(())
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Monotonic id source starting at 1. Ids are never reused.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ActionId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// Lowercase hexadecimal text of an identity.
pub fn encode_id(id: ActionId) -> String {
    format!("{id:x}")
}

/// Parse the text produced by [`encode_id`]. The reserved top bit is cleared.
pub fn decode_id(bytes: &[u8]) -> Result<ActionId> {
    if bytes.is_empty() {
        return Err(PluginError::Serialization(
            "empty action identity".to_string(),
        ));
    }
    if !bytes.iter().all(u8::is_ascii_hexdigit) {
        return Err(PluginError::Serialization(format!(
            "action identity {:?} is not hexadecimal",
            String::from_utf8_lossy(bytes)
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PluginError::Serialization(e.to_string()))?;
    let raw = u64::from_str_radix(text, 16).map_err(|e| {
        PluginError::Serialization(format!("action identity {text:?} out of range: {e}"))
    })?;
    let id = ActionHandle(raw).id();
    if id == 0 {
        return Err(PluginError::Serialization(
            "action identity must not be zero".to_string(),
        ));
    }
    Ok(id)
}
