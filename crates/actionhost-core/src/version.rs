//! Protocol and plugin versions.

use std::fmt;

use actionhost_plugin_sdk::abi;
use actionhost_plugin_sdk::VersionHandle;
use serde::Serialize;

use crate::call;
use crate::error::{ErrorCode, Result};
use crate::module::LoadedModule;

/// Packed `(major, minor)` protocol version advertised by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LibraryVersion {
    pub major: u16,
    pub minor: u16,
}

impl LibraryVersion {
    /// The protocol this host implements.
    pub const CURRENT: LibraryVersion = LibraryVersion::from_packed(abi::ABI_VERSION);

    pub const fn from_packed(packed: u32) -> Self {
        let (major, minor) = abi::unpack_version(packed);
        Self { major, minor }
    }

    pub const fn packed(self) -> u32 {
        abi::pack_version(self.major, self.minor)
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Semantic version of a plugin implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PluginVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub pre_release: String,
    pub build: String,
}

impl PluginVersion {
    /// Read the version object exported by `module`.
    pub fn query(module: &LoadedModule) -> Result<Self> {
        let functions = module.functions();
        let mut handle = VersionHandle::NULL;
        // SAFETY: `handle` outlives the call.
        call::invoke(|err| unsafe { (functions.version_create)(&mut handle, err) })?;

        // SAFETY: the views stay valid until the version object is destroyed below.
        let version = unsafe {
            Self {
                major: (functions.version_major)(handle),
                minor: (functions.version_minor)(handle),
                patch: (functions.version_patch)(handle),
                pre_release: (functions.version_pre_release)(handle).to_string_lossy(),
                build: (functions.version_build)(handle).to_string_lossy(),
            }
        };
        // SAFETY: the handle was created above and is destroyed exactly once.
        call::release("version", ErrorCode::check(unsafe { (functions.version_destroy)(handle) }));
        Ok(version)
    }

    /// Conversion to a `semver` version. Fails when the pre-release or build
    /// text is not valid semver syntax.
    pub fn to_semver(&self) -> std::result::Result<semver::Version, semver::Error> {
        Ok(semver::Version {
            major: u64::from(self.major),
            minor: u64::from(self.minor),
            patch: u64::from(self.patch),
            pre: semver::Prerelease::new(&self.pre_release)?,
            build: semver::BuildMetadata::new(&self.build)?,
        })
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}
