//! Configuration types for the reconciler
//!
//! This module defines all configuration structures used throughout the crate,
//! plus the manifest format that carries desired objects.

use crate::diagnostics::DEFAULT_SENSITIVE_ATTRIBUTES;
use crate::error::{Error, Result};
use crate::model::{DesiredState, ObjectConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Main reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Directory connection configuration
    pub directory: DirectoryConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ReconcileConfig {
    /// Create a configuration for the given directory with defaults elsewhere
    pub fn new(directory: DirectoryConfig) -> Self {
        Self {
            directory,
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.directory.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Directory connection configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryConfig {
    /// LDAP v3 server
    Ldap {
        /// Server URL (`ldap://` or `ldaps://`)
        url: String,
        /// Bind DN used to manage the directory
        bind_dn: String,
        /// Bind password
        bind_password: String,
        /// Skip TLS certificate verification
        #[serde(default)]
        tls_insecure_verify: bool,
        /// Upgrade the connection with StartTLS after dialing
        #[serde(default)]
        use_starttls: bool,
    },

    /// In-memory directory (not persistent)
    #[default]
    Memory,

    /// Custom directory
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DirectoryConfig {
    /// Validate the directory configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            DirectoryConfig::Ldap {
                url,
                bind_dn,
                bind_password,
                ..
            } => {
                if url.is_empty() {
                    return Err(Error::config(
                        "No LDAP url specified: configure the url or LDAP_URL",
                    ));
                }
                if !url.starts_with("ldap://")
                    && !url.starts_with("ldaps://")
                    && !url.starts_with("ldapi://")
                {
                    return Err(Error::config(format!(
                        "LDAP url must use the ldap, ldaps or ldapi scheme. Got: {}",
                        url
                    )));
                }
                if bind_dn.is_empty() {
                    return Err(Error::config(
                        "No LDAP bind dn specified: configure the bind_dn or LDAP_BIND_DN",
                    ));
                }
                if bind_password.is_empty() {
                    return Err(Error::config(
                        "No LDAP bind password specified: configure the bind_password or LDAP_BIND_PASSWORD",
                    ));
                }
                Ok(())
            }
            DirectoryConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom directory factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(Error::config("Custom directory config cannot be null"));
                }
                Ok(())
            }
            DirectoryConfig::Memory => Ok(()),
        }
    }

    /// Get the directory type name
    pub fn type_name(&self) -> &str {
        match self {
            DirectoryConfig::Ldap { .. } => "ldap",
            DirectoryConfig::Memory => "memory",
            DirectoryConfig::Custom { factory, .. } => factory,
        }
    }
}

// The bind password never reaches logs or error messages.
impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryConfig::Ldap {
                url,
                bind_dn,
                tls_insecure_verify,
                use_starttls,
                ..
            } => f
                .debug_struct("Ldap")
                .field("url", url)
                .field("bind_dn", bind_dn)
                .field("bind_password", &"<REDACTED>")
                .field("tls_insecure_verify", tls_insecure_verify)
                .field("use_starttls", use_starttls)
                .finish(),
            DirectoryConfig::Memory => f.write_str("Memory"),
            DirectoryConfig::Custom { factory, config } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", config)
                .finish(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(Error::config("State file path cannot be empty"))
            }
            StateStoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(Error::config("Custom state store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the state store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// How the operations of one update are sent to the directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifyMode {
    /// All operations in one modify request
    ///
    /// The server checks schema constraints once, after every modification,
    /// so a new object class and its required attributes can arrive together.
    #[default]
    SingleRequest,

    /// One modify request per operation, stopping at the first failure
    ///
    /// Operations applied before the failure stay applied.
    PerOperation,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How update operations are grouped into modify requests
    #[serde(default)]
    pub modify_mode: ModifyMode,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Attribute types whose values are redacted in logs and diagnostics
    #[serde(default = "default_sensitive_attributes")]
    pub sensitive_attributes: Vec<String>,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            modify_mode: ModifyMode::default(),
            event_channel_capacity: default_event_channel_capacity(),
            sensitive_attributes: default_sensitive_attributes(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_sensitive_attributes() -> Vec<String> {
    DEFAULT_SENSITIVE_ATTRIBUTES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Desired objects keyed by resource name
///
/// `ignore_changes` keeps its order; a repeated name is kept once.
///
/// ```json
/// {
///   "objects": {
///     "test": {
///       "dn": "cn=test,dc=example,dc=com",
///       "object_classes": ["person"],
///       "attributes": { "sn": ["test"], "userPassword": ["password"] },
///       "ignore_changes": ["userPassword"]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Resource name to desired object
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectConfig>,
}

impl Manifest {
    /// Parse a manifest from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config_conversion(e.to_string()))
    }

    /// Validate every object and convert it into a desired state
    ///
    /// Fails when two resource names claim the same DN.
    pub fn desired_states(&self) -> Result<BTreeMap<String, DesiredState>> {
        let mut desired = BTreeMap::new();
        let mut seen_dns: BTreeMap<&str, &str> = BTreeMap::new();

        for (name, object) in &self.objects {
            if let Some(other) = seen_dns.insert(object.dn.as_str(), name.as_str()) {
                return Err(Error::config_conversion(format!(
                    "objects {} and {} both manage {}",
                    other, name, object.dn
                )));
            }
            let state = DesiredState::try_from(object.clone()).map_err(|e| match e {
                Error::ConfigConversion(msg) => {
                    Error::config_conversion(format!("object {}: {}", name, msg))
                }
                other => other,
            })?;
            desired.insert(name.clone(), state);
        }

        Ok(desired)
    }
}
