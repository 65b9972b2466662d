// # LDAP Directory
//
// This crate provides the LDAP v3 implementation of the `Directory` trait,
// built on the async `ldap3` client.
//
// ## Implementation Status
//
// - ✅ ldap://, ldaps:// and ldapi:// URLs
// - ✅ StartTLS upgrade and optional certificate verification bypass
// - ✅ Simple bind with the configured DN and password
// - ✅ Base/one-level/subtree searches, missing base reported as an empty result
// - ✅ Add, modify (all operations in one request) and delete
// - ❌ NO retry logic (every error is terminal for the call)
// - ❌ NO referral chasing
// - ❌ NO caching (every read hits the server)
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Directory)
//
// **Allowed Capabilities**:
// - ✅ Talk to the configured server only
// - ✅ Translate LDAP results into core errors
// - ⚠️ Spawn exactly one task: the `ldap3` connection driver
//
// **Forbidden Capabilities**:
// - ❌ Implement retry logic
// - ❌ Access the state store (owned by `ReconcileEngine`)
// - ❌ Decide what to change (owned by the diff engine)
//
// ## Security Requirements
//
// - The bind password NEVER appears in logs or Debug output
// - Connection, bind and transport failures surface as `DirectoryConnect` errors

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use ldapobj_core::config::DirectoryConfig;
use ldapobj_core::error::WriteOperation;
use ldapobj_core::model::{AttributeMap, DirectoryEntry, MutationOp, OBJECT_CLASS, SearchScope};
use ldapobj_core::registry::DirectoryRegistry;
use ldapobj_core::traits::{Directory, DirectoryFactory};
use ldapobj_core::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// LDAP result code: success
const RC_SUCCESS: u32 = 0;

/// LDAP result code: the base/target entry does not exist
const RC_NO_SUCH_OBJECT: u32 = 32;

/// LDAP directory connection
///
/// Holds one bound connection. `ldap3` handles are cheap to clone and share
/// the underlying connection, so every request works on its own clone.
pub struct LdapDirectory {
    /// Server URL
    url: String,

    /// DN the connection is bound as
    bind_dn: String,

    /// Bound connection handle
    ldap: Ldap,
}

// Custom Debug implementation that leaves the connection handle out
impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<REDACTED>")
            .finish()
    }
}

impl LdapDirectory {
    /// Dial the server and bind
    ///
    /// # Parameters
    ///
    /// - `config`: Must be [`DirectoryConfig::Ldap`]
    ///
    /// # Returns
    ///
    /// - `Ok(LdapDirectory)`: Connected and bound
    /// - `Err(Error::DirectoryConnect)`: Dial, TLS or bind failure
    /// - `Err(Error::Config)`: Not an LDAP configuration, or invalid
    pub async fn connect(config: &DirectoryConfig) -> Result<Self> {
        config.validate()?;
        let DirectoryConfig::Ldap {
            url,
            bind_dn,
            bind_password,
            tls_insecure_verify,
            use_starttls,
        } = config
        else {
            return Err(Error::config(format!(
                "LDAP directory cannot be built from a {} configuration",
                config.type_name()
            )));
        };

        debug!("Connecting to LDAP server {}", url);
        let settings = LdapConnSettings::new()
            .set_starttls(*use_starttls)
            .set_no_tls_verify(*tls_insecure_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|e| Error::directory_connect(format!("{}: {}", url, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        debug!("Binding as {}", bind_dn);
        let result = ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| Error::directory_connect(format!("bind as {} failed: {}", bind_dn, e)))?;
        if result.rc != RC_SUCCESS {
            return Err(Error::directory_connect(format!(
                "bind as {} failed: {}",
                bind_dn,
                describe_result(&result)
            )));
        }

        info!("Connected to {} as {}", url, bind_dn);
        Ok(Self {
            url: url.clone(),
            bind_dn: bind_dn.clone(),
            ldap,
        })
    }

    /// Server URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send an unbind request and close the connection
    pub async fn unbind(&self) -> Result<()> {
        let mut ldap = self.ldap.clone();
        ldap.unbind()
            .await
            .map_err(|e| Error::directory(format!("unbind from {} failed: {}", self.url, e)))
    }

    fn write_result(
        operation: WriteOperation,
        dn: &str,
        result: std::result::Result<LdapResult, ldap3::LdapError>,
    ) -> Result<()> {
        let result = result.map_err(|e| Error::directory_write(operation, dn, e.to_string()))?;
        if result.rc != RC_SUCCESS {
            return Err(Error::directory_write(operation, dn, describe_result(&result)));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        let mut ldap = self.ldap.clone();
        let requested: Vec<&str> = attributes.iter().map(String::as_str).collect();

        debug!("Searching {} ({}) for {}", base_dn, scope, filter);
        let ldap3::SearchResult(entries, result) = ldap
            .search(base_dn, to_ldap_scope(scope), filter, requested)
            .await
            .map_err(|e| transport_error(&self.url, e))?;

        match result.rc {
            RC_SUCCESS => {}
            RC_NO_SUCH_OBJECT => {
                debug!("Search base {} does not exist", base_dn);
                return Ok(Vec::new());
            }
            _ => {
                return Err(Error::directory(format!(
                    "search of {} failed: {}",
                    base_dn,
                    describe_result(&result)
                )));
            }
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(to_directory_entry)
            .collect())
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let request: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| {
                (
                    name.as_str(),
                    values.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let result = ldap.add(dn, request).await;
        Self::write_result(WriteOperation::Add, dn, result)
    }

    async fn modify(&self, dn: &str, operations: &[MutationOp]) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let mods: Vec<Mod<&str>> = operations.iter().map(to_ldap_mod).collect();

        let result = ldap.modify(dn, mods).await;
        Self::write_result(WriteOperation::Modify, dn, result)
    }

    async fn delete(&self, dn: &str) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let result = ldap.delete(dn).await;
        Self::write_result(WriteOperation::Delete, dn, result)
    }

    fn directory_name(&self) -> &'static str {
        "ldap"
    }
}

fn to_ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::BaseObject => Scope::Base,
        SearchScope::SingleLevel => Scope::OneLevel,
        SearchScope::WholeSubtree => Scope::Subtree,
    }
}

fn to_ldap_mod<'a>(operation: &'a MutationOp) -> Mod<&'a str> {
    let values = |values: &'a [String]| values.iter().map(String::as_str).collect::<HashSet<_>>();
    match operation {
        MutationOp::AddAttribute {
            attribute_type,
            values: v,
        } => Mod::Add(attribute_type.as_str(), values(v)),
        MutationOp::ReplaceAttribute {
            attribute_type,
            values: v,
        } => Mod::Replace(attribute_type.as_str(), values(v)),
        MutationOp::DeleteAttribute {
            attribute_type,
            values: v,
        } => Mod::Delete(attribute_type.as_str(), values(v)),
        MutationOp::AddObjectClasses { classes } => Mod::Add(OBJECT_CLASS, values(classes)),
    }
}

fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    if !entry.bin_attrs.is_empty() {
        let names: Vec<&String> = entry.bin_attrs.keys().collect();
        warn!(
            "Skipping binary attributes {:?} of {}: only UTF-8 values are supported",
            names, entry.dn
        );
    }
    DirectoryEntry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect(),
    }
}

/// A request that never got a result back from the server
fn transport_error(url: &str, err: ldap3::LdapError) -> Error {
    Error::directory_connect(format!("connection to {} failed: {}", url, err))
}

/// Render an LDAP result as `LDAP Result Code N "Name": text`
fn describe_result(result: &LdapResult) -> String {
    format!(
        "LDAP Result Code {} \"{}\": {}",
        result.rc,
        result_code_name(result.rc),
        result.text
    )
}

fn result_code_name(rc: u32) -> &'static str {
    match rc {
        0 => "Success",
        1 => "Operations Error",
        2 => "Protocol Error",
        3 => "Time Limit Exceeded",
        4 => "Size Limit Exceeded",
        8 => "Strong Auth Required",
        10 => "Referral",
        16 => "No Such Attribute",
        17 => "Undefined Attribute Type",
        19 => "Constraint Violation",
        20 => "Attribute Or Value Exists",
        21 => "Invalid Attribute Syntax",
        32 => "No Such Object",
        34 => "Invalid DN Syntax",
        49 => "Invalid Credentials",
        50 => "Insufficient Access Rights",
        51 => "Busy",
        52 => "Unavailable",
        53 => "Unwilling To Perform",
        64 => "Naming Violation",
        65 => "Object Class Violation",
        66 => "Not Allowed On Non Leaf",
        67 => "Not Allowed On RDN",
        68 => "Entry Already Exists",
        69 => "Object Class Modifications Prohibited",
        80 => "Other",
        _ => "Unknown",
    }
}

/// Factory for [`LdapDirectory`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapDirectoryFactory;

#[async_trait]
impl DirectoryFactory for LdapDirectoryFactory {
    async fn create(&self, config: &DirectoryConfig) -> Result<Box<dyn Directory>> {
        Ok(Box::new(LdapDirectory::connect(config).await?))
    }
}

/// Register the `ldap` directory type
pub fn register(registry: &DirectoryRegistry) {
    registry.register_directory("ldap", Box::new(LdapDirectoryFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(to_ldap_scope(SearchScope::BaseObject), Scope::Base));
        assert!(matches!(to_ldap_scope(SearchScope::SingleLevel), Scope::OneLevel));
        assert!(matches!(to_ldap_scope(SearchScope::WholeSubtree), Scope::Subtree));
    }

    #[test]
    fn test_mod_conversion() {
        let op = MutationOp::AddObjectClasses {
            classes: vec!["uidObject".to_string()],
        };
        match to_ldap_mod(&op) {
            Mod::Add(name, values) => {
                assert_eq!(name, "objectClass");
                assert!(values.contains("uidObject"));
            }
            _ => panic!("expected Mod::Add"),
        }

        let op = MutationOp::DeleteAttribute {
            attribute_type: "mail".to_string(),
            values: vec![],
        };
        match to_ldap_mod(&op) {
            Mod::Delete(name, values) => {
                assert_eq!(name, "mail");
                assert!(values.is_empty());
            }
            _ => panic!("expected Mod::Delete"),
        }

        let op = MutationOp::ReplaceAttribute {
            attribute_type: "sn".to_string(),
            values: vec!["a".to_string(), "c".to_string()],
        };
        assert!(matches!(to_ldap_mod(&op), Mod::Replace("sn", values) if values.len() == 2));
    }

    #[test]
    fn test_result_description() {
        let result = LdapResult {
            rc: 68,
            matched: String::new(),
            text: String::new(),
            refs: vec![],
            ctrls: vec![],
        };
        assert_eq!(
            describe_result(&result),
            "LDAP Result Code 68 \"Entry Already Exists\": "
        );
        assert_eq!(result_code_name(12345), "Unknown");
    }

    #[test]
    fn test_entry_conversion_keeps_text_attributes() {
        let entry = SearchEntry {
            dn: "cn=test,dc=example,dc=com".to_string(),
            attrs: [
                ("objectClass".to_string(), vec!["person".to_string()]),
                ("sn".to_string(), vec!["test".to_string()]),
            ]
            .into_iter()
            .collect(),
            bin_attrs: [("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]])]
                .into_iter()
                .collect(),
        };

        let converted = to_directory_entry(entry);
        assert_eq!(converted.object_classes(), ["person"]);
        assert_eq!(converted.attributes["sn"], vec!["test"]);
        assert!(!converted.attributes.contains_key("jpegPhoto"));
    }

    #[test]
    fn test_transport_failure_is_a_connect_error() {
        let err = transport_error("ldap://localhost:389", ldap3::LdapError::EndOfStream);
        assert!(matches!(err, Error::DirectoryConnect(_)));
        assert!(err.to_string().contains("ldap://localhost:389"));
    }

    #[tokio::test]
    async fn test_factory_rejects_non_ldap_config() {
        let err = LdapDirectoryFactory
            .create(&DirectoryConfig::Memory)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_register() {
        let registry = DirectoryRegistry::with_builtins();
        register(&registry);
        assert!(registry.has_directory("ldap"));
        assert!(registry.has_directory("memory"));
    }
}
