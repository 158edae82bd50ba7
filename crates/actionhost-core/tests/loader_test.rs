//! Module binding: version negotiation and symbol resolution.

mod common;

use std::ffi::c_int;

use actionhost_core::{LibraryVersion, LoadError, LoadedModule, ModuleRegistry};
use actionhost_plugin_sdk::abi;
use actionhost_plugin_sdk::ffi::symbols;

extern "C" fn refuses_every_host(_host: u32) -> c_int {
    0
}

extern "C" fn future_version() -> u32 {
    abi::pack_version(abi::ABI_VERSION_MAJOR + 1, 0)
}

#[test]
fn test_binds_every_symbol() {
    let module = common::sample_module();
    assert_eq!(module.version(), LibraryVersion::CURRENT);
    assert_eq!(module.path().to_str(), Some("sample-plugin"));
    assert_eq!(module, module.clone());
}

#[test]
fn test_missing_symbol_is_named() {
    for name in symbols::ALL.iter().skip(2) {
        let mut table = common::sample_symbols();
        table.remove(name);
        let result = unsafe { LoadedModule::from_symbols("partial", &table) };
        match result {
            Err(LoadError::FunctionLoad { name: missing, .. }) => assert_eq!(missing, *name),
            other => panic!("expected FunctionLoad for {name}, got {other:?}"),
        }
    }
}

#[test]
fn test_version_symbols_are_required() {
    for name in [symbols::VERSION, symbols::IS_LIBRARY_COMPATIBLE] {
        let mut table = common::sample_symbols();
        table.remove(name);
        let err = unsafe { LoadedModule::from_symbols("unversioned", &table) }.unwrap_err();
        assert!(err.to_string().contains(name), "{err}");
    }
}

#[test]
fn test_incompatible_module_is_rejected_before_binding() {
    let mut table = common::sample_symbols();
    table
        .insert(symbols::VERSION, future_version as *const ())
        .insert(symbols::IS_LIBRARY_COMPATIBLE, refuses_every_host as *const ())
        .remove(symbols::ACTION_EQUAL);

    match unsafe { LoadedModule::from_symbols("future", &table) } {
        Err(LoadError::Incompatible { current, found }) => {
            assert_eq!(current, LibraryVersion::CURRENT);
            assert_eq!(found.major, abi::ABI_VERSION_MAJOR + 1);
        }
        other => panic!("expected Incompatible, got {other:?}"),
    }
}

#[test]
fn test_missing_file_is_system_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libnothing.so");

    let err = LoadedModule::load(&path).unwrap_err();
    assert!(matches!(err, LoadError::System { .. }));
    assert!(err.to_string().contains("libnothing.so"), "{err}");

    let registry = ModuleRegistry::new();
    assert!(registry.load(&path).is_err());
    assert!(registry.is_empty());
}
