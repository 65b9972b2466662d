// # ldapobjctl - Declarative LDAP Object Manager
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// CRITICAL RULES:
// - This is a THIN integration layer ONLY
// - DO NOT add diff, ignore or lifecycle logic here
// - All reconciliation logic MUST be in ldapobj-core
// - Connection settings come from environment variables; what to manage
//   comes from the manifest file
//
// ldapobjctl is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering the directory implementations
// 4. Driving the engine for one command and printing the result as JSON
//
// ## Configuration
//
// ### Directory
// - `LDAPOBJ_DIRECTORY_TYPE`: Directory type (ldap, memory). Default: ldap
// - `LDAP_URL`: Server URL (ldap://, ldaps:// or ldapi://)
// - `LDAP_BIND_DN`: DN to bind as
// - `LDAP_BIND_PASSWORD`: Bind password
// - `LDAP_TLS_INSECURE_VERIFY`: Skip certificate verification (true/false)
// - `LDAP_TLS_USE_STARTTLS`: Upgrade ldap:// connections with StartTLS (true/false)
//
// ### State
// - `LDAPOBJ_STATE_PATH`: State file. Default: ldapobj.state.json
//
// ### Engine
// - `LDAPOBJ_MODIFY_MODE`: single_request or per_operation. Default: single_request
// - `LDAPOBJ_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// ## Example
//
// ```bash
// export LDAP_URL=ldap://localhost:389
// export LDAP_BIND_DN=cn=admin,dc=example,dc=com
// export LDAP_BIND_PASSWORD=admin
//
// ldapobjctl plan objects.json
// ldapobjctl apply objects.json
// ldapobjctl import legacy cn=legacy,dc=example,dc=com --ignore userPassword
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ldapobj_core::{
    DirectoryConfig, DirectoryRegistry, EngineConfig, IgnoreSet, Manifest, ModifyMode,
    ReconcileEngine, SearchQuery, SearchScope, StateStoreConfig,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes
///
/// - 0: Command succeeded
/// - 1: Configuration or startup error
/// - 2: Directory or state error while running the command
#[derive(Debug, Clone, Copy)]
enum CtlExitCode {
    /// Command succeeded
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<CtlExitCode> for ExitCode {
    fn from(code: CtlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Manage LDAP directory objects declaratively
#[derive(Debug, Parser)]
#[command(name = "ldapobjctl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show what apply would change
    Plan {
        /// Manifest file (JSON)
        manifest: PathBuf,
    },

    /// Converge the directory on the manifest
    ///
    /// Objects recorded in state but missing from the manifest are deleted.
    Apply {
        /// Manifest file (JSON)
        manifest: PathBuf,
    },

    /// Delete managed objects and drop their records
    Destroy {
        /// Resource names; all recorded objects when empty
        names: Vec<String>,
    },

    /// Adopt an existing entry under a resource name
    Import {
        /// Resource name to record the entry under
        name: String,
        /// DN of the existing entry
        dn: String,
        /// Attribute types to leave out of drift detection
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },

    /// Read one entry without managing it
    Show {
        /// DN of the entry
        dn: String,
        /// Operational attributes to fetch as well
        #[arg(long = "attribute")]
        attributes: Vec<String>,
    },

    /// Search the directory
    Search {
        /// Search base
        base_dn: String,
        /// baseObject, singleLevel or wholeSubtree
        #[arg(long, default_value = "baseObject")]
        scope: SearchScope,
        /// LDAP filter. Default: (objectClass=*)
        #[arg(long)]
        filter: Option<String>,
        /// Operational attributes to fetch as well
        #[arg(long = "attribute")]
        attributes: Vec<String>,
    },

    /// Print recorded state
    State {
        /// Resource name; all recorded objects when omitted
        name: Option<String>,
    },
}

/// Application configuration
struct Config {
    directory_type: String,
    ldap_url: Option<String>,
    bind_dn: String,
    bind_password: String,
    tls_insecure_verify: bool,
    use_starttls: bool,
    state_path: String,
    modify_mode: ModifyMode,
    log_level: String,
}

// Custom Debug implementation to prevent the bind password from leaking
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory_type", &self.directory_type)
            .field("ldap_url", &self.ldap_url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<REDACTED>")
            .field("tls_insecure_verify", &self.tls_insecure_verify)
            .field("use_starttls", &self.use_starttls)
            .field("state_path", &self.state_path)
            .field("modify_mode", &self.modify_mode)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            directory_type: env::var("LDAPOBJ_DIRECTORY_TYPE")
                .unwrap_or_else(|_| "ldap".to_string()),
            ldap_url: env::var("LDAP_URL").ok(),
            bind_dn: env::var("LDAP_BIND_DN").unwrap_or_default(),
            bind_password: env::var("LDAP_BIND_PASSWORD").unwrap_or_default(),
            tls_insecure_verify: env_flag("LDAP_TLS_INSECURE_VERIFY")?,
            use_starttls: env_flag("LDAP_TLS_USE_STARTTLS")?,
            state_path: env::var("LDAPOBJ_STATE_PATH")
                .unwrap_or_else(|_| "ldapobj.state.json".to_string()),
            modify_mode: match env::var("LDAPOBJ_MODIFY_MODE").as_deref() {
                Err(_) | Ok("single_request") => ModifyMode::SingleRequest,
                Ok("per_operation") => ModifyMode::PerOperation,
                Ok(other) => anyhow::bail!(
                    "LDAPOBJ_MODIFY_MODE '{}' is not valid. \
                    Valid modes: single_request, per_operation",
                    other
                ),
            },
            log_level: env::var("LDAPOBJ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.directory_type.as_str() {
            "ldap" => self.validate_ldap()?,
            "memory" => {}
            _ => anyhow::bail!(
                "LDAPOBJ_DIRECTORY_TYPE '{}' is not supported. \
                Supported types: ldap, memory",
                self.directory_type
            ),
        }

        if self.state_path.is_empty() {
            anyhow::bail!("LDAPOBJ_STATE_PATH cannot be empty");
        }
        if let Some(parent) = std::path::Path::new(&self.state_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "LDAPOBJ_STATE_PATH parent directory does not exist: {}",
                parent.display()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "LDAPOBJ_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn validate_ldap(&self) -> Result<()> {
        let Some(url) = self.ldap_url.as_deref().filter(|u| !u.is_empty()) else {
            anyhow::bail!(
                "LDAP_URL is required. \
                Set it via: export LDAP_URL=ldap://localhost:389"
            );
        };

        if !["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            anyhow::bail!("LDAP_URL must use ldap://, ldaps:// or ldapi://. Got: {}", url);
        }

        if self.use_starttls && url.starts_with("ldaps://") {
            anyhow::bail!("LDAP_TLS_USE_STARTTLS cannot be combined with an ldaps:// URL");
        }

        if self.bind_dn.is_empty() {
            anyhow::bail!("LDAP_BIND_DN is required when LDAPOBJ_DIRECTORY_TYPE=ldap");
        }

        if url.starts_with("ldap://") && !self.use_starttls {
            eprintln!(
                "WARNING: LDAP_URL uses ldap:// without StartTLS. \
                The bind password is sent in clear text."
            );
        }

        Ok(())
    }

    fn directory_config(&self) -> DirectoryConfig {
        match self.directory_type.as_str() {
            "ldap" => DirectoryConfig::Ldap {
                url: self.ldap_url.clone().unwrap_or_default(),
                bind_dn: self.bind_dn.clone(),
                bind_password: self.bind_password.clone(),
                tls_insecure_verify: self.tls_insecure_verify,
                use_starttls: self.use_starttls,
            },
            _ => DirectoryConfig::Memory,
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            modify_mode: self.modify_mode,
            ..EngineConfig::default()
        }
    }
}

/// Parse a boolean environment variable, unset meaning false
fn env_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(false),
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => anyhow::bail!("{} must be true or false. Got: {}", name, value),
        },
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CtlExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CtlExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays machine readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CtlExitCode::ConfigError.into();
    }

    debug!("Configuration loaded: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CtlExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let engine = match build_engine(&config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return CtlExitCode::ConfigError;
            }
        };

        let result = run_command(&engine, cli.command).await;
        let flushed = engine.flush().await;

        match (result, flushed) {
            (Ok(output), Ok(())) => {
                println!("{}", output);
                CtlExitCode::Success
            }
            (Err(e), _) => {
                error!("{:#}", e);
                CtlExitCode::RuntimeError
            }
            (Ok(_), Err(e)) => {
                error!("Failed to persist state: {}", e);
                CtlExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Connect the directory, open the state file and build the engine
async fn build_engine(config: &Config) -> Result<ReconcileEngine> {
    let registry = DirectoryRegistry::with_builtins();

    #[cfg(feature = "ldap")]
    ldapobj_ldap::register(&registry);

    let directory_config = config.directory_config();
    info!("Using {} directory", directory_config.type_name());
    let directory = registry
        .create_directory(&directory_config)
        .await
        .context("failed to open directory")?;

    let state_store = registry
        .create_state_store(&StateStoreConfig::File {
            path: config.state_path.clone(),
        })
        .await
        .with_context(|| format!("failed to open state file {}", config.state_path))?;

    let (engine, mut events) =
        ReconcileEngine::new(directory, state_store, config.engine_config())?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    Ok(engine)
}

async fn load_manifest(path: &PathBuf) -> Result<Manifest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    Manifest::from_json_str(&text).with_context(|| format!("invalid manifest {}", path.display()))
}

/// Run one command and render its result
async fn run_command(engine: &ReconcileEngine, command: Command) -> Result<Value> {
    let sensitive = &engine.config().sensitive_attributes;

    match command {
        Command::Plan { manifest } => {
            let desired = load_manifest(&manifest).await?.desired_states()?;
            let mut plan = serde_json::Map::new();

            for (name, state) in &desired {
                let action = engine.plan(name, state.clone()).await?;
                plan.insert(name.clone(), serde_json::to_value(action.masked(sensitive))?);
            }
            for name in orphans(engine, &desired).await? {
                plan.insert(name, json!({ "action": "delete" }));
            }

            Ok(Value::Object(plan))
        }

        Command::Apply { manifest } => {
            let desired = load_manifest(&manifest).await?.desired_states()?;
            let mut applied = serde_json::Map::new();
            let mut failures = 0usize;

            for (name, state) in desired.clone() {
                match engine.apply(&name, state).await {
                    Ok(outcome) => {
                        applied.insert(name, serde_json::to_value(outcome.change.masked(sensitive))?);
                    }
                    Err(e) => {
                        failures += 1;
                        applied.insert(name, json!({ "change": "failed", "error": e.to_string() }));
                    }
                }
            }
            for name in orphans(engine, &desired).await? {
                match engine.destroy(&name).await {
                    Ok(()) => {
                        applied.insert(name, json!({ "change": "deleted" }));
                    }
                    Err(e) => {
                        failures += 1;
                        applied.insert(name, json!({ "change": "failed", "error": e.to_string() }));
                    }
                }
            }

            if failures > 0 {
                println!("{}", Value::Object(applied));
                anyhow::bail!("{} object(s) failed to apply", failures);
            }
            Ok(Value::Object(applied))
        }

        Command::Destroy { names } => {
            let names = if names.is_empty() {
                engine.recorded_names().await?
            } else {
                names
            };
            for name in &names {
                engine.destroy(name).await?;
            }
            Ok(json!({ "destroyed": names }))
        }

        Command::Import { name, dn, ignore } => {
            let ignore = (!ignore.is_empty()).then(|| ignore.into_iter().collect::<IgnoreSet>());
            let state = engine.import(&name, &dn, ignore).await?;
            Ok(json!({
                "name": name,
                "state": masked_state(serde_json::to_value(&state)?, &state.attributes, sensitive),
            }))
        }

        Command::Show { dn, attributes } => {
            let mut object = engine.lookup_object(&dn, &attributes).await?;
            object.attributes = ldapobj_core::diagnostics::mask_attributes(&object.attributes, sensitive);
            Ok(serde_json::to_value(object)?)
        }

        Command::Search {
            base_dn,
            scope,
            filter,
            attributes,
        } => {
            let mut query = SearchQuery::new(base_dn).with_scope(scope);
            if let Some(filter) = filter {
                query = query.with_filter(filter);
            }
            query.additional_attributes = attributes;

            let mut data = engine.search(&query).await?;
            for result in &mut data.results {
                *result = ldapobj_core::diagnostics::mask_attributes(result, sensitive);
            }
            Ok(serde_json::to_value(data)?)
        }

        Command::State { name } => {
            let names = match name {
                Some(name) => vec![name],
                None => engine.recorded_names().await?,
            };
            let mut states = serde_json::Map::new();
            for name in names {
                let record = engine
                    .record(&name)
                    .await?
                    .with_context(|| format!("no recorded state for {}", name))?;
                let state = &record.state;
                states.insert(
                    name,
                    json!({
                        "last_updated": record.last_updated,
                        "state": masked_state(serde_json::to_value(state)?, &state.attributes, sensitive),
                    }),
                );
            }
            Ok(Value::Object(states))
        }
    }
}

/// Recorded names that the manifest no longer mentions
async fn orphans<T>(
    engine: &ReconcileEngine,
    desired: &std::collections::BTreeMap<String, T>,
) -> Result<BTreeSet<String>> {
    Ok(engine
        .recorded_names()
        .await?
        .into_iter()
        .filter(|name| !desired.contains_key(name))
        .collect())
}

fn masked_state(
    mut value: Value,
    attributes: &ldapobj_core::AttributeMap,
    sensitive: &[String],
) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "attributes".to_string(),
            json!(ldapobj_core::diagnostics::mask_attributes(attributes, sensitive)),
        );
    }
    value
}
