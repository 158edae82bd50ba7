//! Identity of the reference plugin.

pub const PLUGIN_NAME: &str = "sample_action_plugin";
pub const PLUGIN_DESCRIPTION: &str =
    "Reference plugin exercising the actionhost contract with a scripted action registry";

/// Semantic version reported through the version object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub pre_release: &'static str,
    pub build: &'static str,
}

pub const PLUGIN_VERSION: VersionInfo = VersionInfo {
    major: 0,
    minor: 0,
    patch: 1,
    pre_release: "alpha",
    build: "12345",
};

/// Long and short texts of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorText {
    pub name: String,
    pub short_name: String,
    pub description: String,
    pub short_description: String,
}

impl DescriptorText {
    /// Texts with empty short variants.
    pub fn long_only(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn plugin() -> Self {
        Self::long_only(PLUGIN_NAME, PLUGIN_DESCRIPTION)
    }
}
