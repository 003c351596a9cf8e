//! Engine configuration
//!
//! All fields have defaults matching a stock RESTCONF gateway, so an empty
//! JSON object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{RestconfError, Result};

/// Identity of the built-in subscription RPC
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SubscriptionConfig {
    /// Namespace of the module declaring the RPC
    pub namespace: String,
    /// Local name of the RPC
    pub rpc_name: String,
    /// Input leaf carrying the subscribed instance identifier
    pub path_leaf: String,
    /// Output leaf carrying the derived stream name
    pub output_leaf: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            namespace: "urn:opendaylight:params:xml:ns:yang:controller:md:sal:remote".into(),
            rpc_name: "create-data-change-event-subscription".into(),
            path_leaf: "path".into(),
            output_leaf: "stream-name".into(),
        }
    }
}

/// Bootstrap module whose names are used by synthesized listings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BootstrapModule {
    pub name: String,
    pub namespace: String,
    /// Revision as `yyyy-MM-dd`
    pub revision: String,
}

impl Default for BootstrapModule {
    fn default() -> Self {
        Self {
            name: "ietf-restconf".into(),
            namespace: "urn:ietf:params:xml:ns:yang:ietf-restconf".into(),
            revision: "2013-10-19".into(),
        }
    }
}

/// Configuration of the translation engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Path segment separating local and mounted parts of an identifier
    pub mount_marker: String,
    /// Built-in subscription RPC
    pub subscription: SubscriptionConfig,
    /// Module used to name listing containers
    pub restconf_module: BootstrapModule,
    /// Accept a namespace hint equal to the owning module's name string
    pub accept_module_name_hint: bool,
    /// Depth applied to reads that pass no depth parameter; `None` is unbounded
    pub default_depth: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mount_marker: "yang-ext:mount".into(),
            subscription: SubscriptionConfig::default(),
            restconf_module: BootstrapModule::default(),
            accept_module_name_hint: true,
            default_depth: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        content.parse()
    }
}

impl std::str::FromStr for EngineConfig {
    type Err = RestconfError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = "{}".parse().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.mount_marker, "yang-ext:mount");
        assert!(config.accept_module_name_hint);
        assert_eq!(config.default_depth, None);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig =
            r#"{"accept-module-name-hint": false, "default-depth": 2, "subscription": {"output-leaf": "stream"}}"#
                .parse()
                .unwrap();
        assert!(!config.accept_module_name_hint);
        assert_eq!(config.subscription.output_leaf, "stream");
        assert_eq!(config.subscription.path_leaf, "path");
        assert_eq!(config.default_depth, Some(2));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mount-marker": "ext:mount"}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mount_marker, "ext:mount");
    }
}
