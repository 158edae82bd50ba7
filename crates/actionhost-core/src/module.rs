//! Module loading.
//!
//! [`LoadedModule::load`] opens a shared library, negotiates the protocol
//! version and resolves the full [`FunctionTable`]. Version negotiation runs
//! before any other symbol is touched, so a host never calls into a module
//! whose layouts it cannot trust.
//!
//! Modules are reference counted: every plugin, action and descriptor built
//! from a module keeps it loaded until the last of them is dropped.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use actionhost_plugin_sdk::abi;
use actionhost_plugin_sdk::ffi::{self, symbols};
use libloading::Library;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::LoadError;
use crate::function_table::{resolve_one, FunctionTable};
use crate::version::LibraryVersion;

/// Source of exported symbols.
pub trait SymbolResolver {
    /// Look `name` up as a value of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be the function-pointer type of the symbol.
    unsafe fn resolve<T: Copy>(
        &self,
        name: &'static str,
    ) -> Result<T, Box<dyn StdError + Send + Sync>>;
}

impl SymbolResolver for Library {
    unsafe fn resolve<T: Copy>(
        &self,
        name: &'static str,
    ) -> Result<T, Box<dyn StdError + Send + Sync>> {
        // SAFETY: forwarded from the caller.
        let symbol = unsafe { self.get::<T>(name.as_bytes()) }?;
        Ok(*symbol)
    }
}

/// In-process symbol table, for plugins linked into the host binary.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbols {
    symbols: HashMap<&'static str, usize>,
}

impl StaticSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the address of `name`.
    pub fn insert(&mut self, name: &'static str, address: *const ()) -> &mut Self {
        self.symbols.insert(name, address as usize);
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.symbols.remove(name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}

impl SymbolResolver for StaticSymbols {
    unsafe fn resolve<T: Copy>(
        &self,
        name: &'static str,
    ) -> Result<T, Box<dyn StdError + Send + Sync>> {
        let address = match self.symbols.get(name) {
            Some(&address) if address != 0 => address,
            _ => return Err(format!("undefined symbol: {name}").into()),
        };
        if std::mem::size_of::<T>() != std::mem::size_of::<usize>() {
            return Err(format!("symbol {name} is not pointer-sized").into());
        }
        // SAFETY: sizes match and the caller guarantees `T` is the
        // function-pointer type of the registered address.
        Ok(unsafe { std::mem::transmute_copy::<usize, T>(&address) })
    }
}

struct ModuleInner {
    functions: FunctionTable,
    version: LibraryVersion,
    path: PathBuf,
    // Dropped last: unloads the code the table points into.
    _library: Option<Library>,
}

/// A loaded module and its function table.
///
/// Two modules are equal when they were loaded from the same path.
#[derive(Clone)]
pub struct LoadedModule(Arc<ModuleInner>);

impl LoadedModule {
    /// Open the shared library at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading module");

        // SAFETY: running the library's initialisers is inherent to loading
        // a plugin; callers choose which paths to trust.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::System {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: the library exports the contract's symbols by name.
        let (version, functions) = unsafe { bind(&library)? };

        debug!(path = %path.display(), version = %version, "module loaded");
        Ok(Self(Arc::new(ModuleInner {
            functions,
            version,
            path: path.to_path_buf(),
            _library: Some(library),
        })))
    }

    /// Build a module from an in-process symbol table. `label` stands in for
    /// the path in equality checks and diagnostics.
    ///
    /// # Safety
    ///
    /// Every address in `symbols` must be a function with the contract's
    /// signature for its name, valid for the rest of the process.
    pub unsafe fn from_symbols(
        label: impl Into<PathBuf>,
        symbols: &StaticSymbols,
    ) -> Result<Self, LoadError> {
        // SAFETY: forwarded from the caller.
        let (version, functions) = unsafe { bind(symbols)? };
        Ok(Self(Arc::new(ModuleInner {
            functions,
            version,
            path: label.into(),
            _library: None,
        })))
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Protocol version the module advertised.
    pub fn version(&self) -> LibraryVersion {
        self.0.version
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.0.functions
    }

    fn downgrade(&self) -> Weak<ModuleInner> {
        Arc::downgrade(&self.0)
    }
}

/// Negotiate the protocol version, then resolve the function table.
///
/// # Safety
///
/// Symbols found by `resolver` must have the contract's signatures.
unsafe fn bind<R: SymbolResolver>(resolver: &R) -> Result<(LibraryVersion, FunctionTable), LoadError> {
    // SAFETY: forwarded from the caller.
    let (version, is_compatible) = unsafe {
        (
            resolve_one::<R, ffi::VersionFn>(resolver, symbols::VERSION)?,
            resolve_one::<R, ffi::IsCompatibleFn>(resolver, symbols::IS_LIBRARY_COMPATIBLE)?,
        )
    };

    // SAFETY: both entry points take no pointers.
    let found = LibraryVersion::from_packed(unsafe { version() });
    if unsafe { is_compatible(abi::ABI_VERSION) } == 0 {
        return Err(LoadError::Incompatible {
            current: LibraryVersion::CURRENT,
            found,
        });
    }

    // SAFETY: forwarded from the caller.
    let functions = unsafe { FunctionTable::resolve(resolver)? };
    Ok((found, functions))
}

impl PartialEq for LoadedModule {
    fn eq(&self, other: &Self) -> bool {
        self.0.path == other.0.path
    }
}

impl Eq for LoadedModule {}

impl Hash for LoadedModule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.path.hash(state);
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.0.path)
            .field("version", &self.0.version)
            .field("dynamic", &self.0._library.is_some())
            .finish()
    }
}

/// Deduplicates loads of the same file.
///
/// While a previously returned module is alive, loading the same path again
/// returns it instead of opening the library a second time.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<HashMap<PathBuf, Weak<ModuleInner>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedModule, LoadError> {
        let path = path.as_ref();
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut modules = self.modules.lock();
        if let Some(inner) = modules.get(&key).and_then(Weak::upgrade) {
            debug!(path = %key.display(), "reusing loaded module");
            return Ok(LoadedModule(inner));
        }

        let module = LoadedModule::load(&key)?;
        modules.retain(|_, module| module.strong_count() > 0);
        modules.insert(key, module.downgrade());
        Ok(module)
    }

    /// Number of modules still alive.
    pub fn len(&self) -> usize {
        self.modules
            .lock()
            .values()
            .filter(|module| module.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LoadedModule::load(dir.path().join("libabsent.so"));
        assert!(matches!(result, Err(LoadError::System { .. })));
    }

    #[test]
    fn test_static_symbols_reject_unknown_names() {
        let table = StaticSymbols::new();
        let result = unsafe { table.resolve::<ffi::VersionFn>(symbols::VERSION) };
        let message = result.unwrap_err().to_string();
        assert!(message.contains("ahp_version"));
    }

    #[test]
    fn test_registry_of_nothing_is_empty() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.load("/definitely/not/here.so").is_err());
        assert!(registry.is_empty());
    }
}
