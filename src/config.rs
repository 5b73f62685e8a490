//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/psdb/psdb.toml`
//! 3. Project config: nearest `.psdb.toml` walking up from the working directory
//! 4. Environment variables: `PSDB_*` prefix
//! 5. Command-line flags
//!
//! Every layer is an all-optional [`ConfigLayer`]; a layer only overrides the
//! fields it sets. The merged result is an immutable [`EffectiveConfig`].

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use config::{Config, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

pub const APP_NAME: &str = "psdb";
pub const GLOBAL_CONFIG_FILE: &str = "psdb.toml";
pub const PROJECT_CONFIG_FILE: &str = ".psdb.toml";
pub const ENV_PREFIX: &str = "PSDB";
pub const DEFAULT_API_URL: &str = "https://api.planetscale.com/v1";

/// Errors raised while resolving or persisting configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting `{}`: {}", .0, .0.hint())]
    MissingField(Field),

    #[error("invalid value {value:?} for `{key}`: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: String,
    },

    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot determine the global config directory")]
    NoConfigDir,

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("environment: {0}")]
    Environment(#[from] config::ConfigError),
}

impl ConfigError {
    /// True for failures of the local filesystem rather than of the settings themselves.
    pub fn is_io(&self) -> bool {
        matches!(self, ConfigError::Write { .. })
    }
}

/// Settings a command may require before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Organization,
    Database,
    Branch,
    AccessToken,
}

impl Field {
    fn hint(self) -> &'static str {
        match self {
            Field::Organization => "pass --org, set PSDB_ORG, or add `org` to a config file",
            Field::Database => {
                "pass --database, set PSDB_DATABASE, or add `database` to a config file"
            }
            Field::Branch => "pass --branch, set PSDB_BRANCH, or add `branch` to a config file",
            Field::AccessToken => {
                "set PSDB_ACCESS_TOKEN or add `access_token` to the global config file"
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Organization => "organization",
            Field::Database => "database",
            Field::Branch => "branch",
            Field::AccessToken => "access_token",
        };
        f.write_str(name)
    }
}

/// How results and errors are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Formatted text with progress indicators
    #[default]
    Human,
    /// Structured JSON documents only
    Json,
}

impl OutputMode {
    pub fn is_json(self) -> bool {
        self == OutputMode::Json
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        <OutputMode as ValueEnum>::from_str(value.trim(), true).map_err(|_| {
            ConfigError::InvalidValue {
                key: "output",
                value: value.to_string(),
                expected: "`human` or `json`".into(),
            }
        })
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Human => f.write_str("human"),
            OutputMode::Json => f.write_str("json"),
        }
    }
}

/// One configuration source. `None` means "not set by this layer".
///
/// This is also the on-disk layout of both config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl ConfigLayer {
    /// Apply `top` over `self`: every field set in `top` wins.
    pub fn overlay(self, top: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            org: top.org.or(self.org),
            database: top.database.or(self.database),
            branch: top.branch.or(self.branch),
            access_token: top.access_token.or(self.access_token),
            output: top.output.or(self.output),
            api_url: top.api_url.or(self.api_url),
        }
    }

    /// Blank strings count as unset.
    pub fn normalized(self) -> ConfigLayer {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        ConfigLayer {
            org: keep(self.org),
            database: keep(self.database),
            branch: keep(self.branch),
            access_token: keep(self.access_token),
            output: self.output,
            api_url: keep(self.api_url),
        }
    }
}

/// Fully resolved settings for one invocation. Never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    organization: Option<String>,
    database: Option<String>,
    branch: Option<String>,
    access_token: Option<String>,
    output: OutputMode,
    api_url: String,
    project_file: Option<PathBuf>,
}

impl EffectiveConfig {
    /// Merge layers given lowest precedence first, then fill compiled defaults.
    pub fn from_layers<I>(layers: I, project_file: Option<PathBuf>) -> Self
    where
        I: IntoIterator<Item = ConfigLayer>,
    {
        let merged = layers
            .into_iter()
            .map(ConfigLayer::normalized)
            .fold(ConfigLayer::default(), ConfigLayer::overlay);

        Self {
            organization: merged.org,
            database: merged.database,
            branch: merged.branch,
            access_token: merged.access_token,
            output: merged.output.unwrap_or_default(),
            api_url: merged.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            project_file,
        }
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn output(&self) -> OutputMode {
        self.output
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Project config file that contributed to this config, if any.
    pub fn project_file(&self) -> Option<&Path> {
        self.project_file.as_deref()
    }

    /// Value of a field that the current command cannot run without.
    pub fn require(&self, field: Field) -> Result<&str, ConfigError> {
        let value = match field {
            Field::Organization => self.organization(),
            Field::Database => self.database(),
            Field::Branch => self.branch(),
            Field::AccessToken => self.access_token(),
        };
        value.ok_or(ConfigError::MissingField(field))
    }
}

/// Get the XDG config directory for psdb.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Find the nearest project config file, starting at `start` and walking up.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Load a TOML file into a layer. A missing file is not an error.
pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let layer: ConfigLayer = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(layer.normalized()))
}

/// Reads every configuration source for one invocation.
#[derive(Debug, Clone)]
pub struct Resolver {
    global_path: Option<PathBuf>,
    working_dir: PathBuf,
    env: Option<config::Map<String, String>>,
}

impl Resolver {
    /// Resolver with an explicit global file and working directory.
    /// Environment variables are read from the process unless replaced via [`Resolver::with_env`].
    pub fn new(global_path: Option<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_path,
            working_dir: working_dir.into(),
            env: None,
        }
    }

    /// Resolver for the running process: XDG global file, current directory.
    pub fn from_process() -> Result<Self, ConfigError> {
        let working_dir = std::env::current_dir().map_err(|source| ConfigError::Read {
            path: PathBuf::from("."),
            source,
        })?;
        Ok(Self::new(global_config_path(), working_dir))
    }

    /// Use `vars` instead of the process environment.
    pub fn with_env(mut self, vars: config::Map<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Global config path, or an error when no location is known.
    pub fn require_global_path(&self) -> Result<&Path, ConfigError> {
        self.global_path().ok_or(ConfigError::NoConfigDir)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Where a project config write should land: the discovered file, else the working directory.
    pub fn project_target(&self) -> PathBuf {
        find_project_config(&self.working_dir)
            .unwrap_or_else(|| self.working_dir.join(PROJECT_CONFIG_FILE))
    }

    /// Output mode requested through `PSDB_OUTPUT`, if valid.
    pub fn env_output(&self) -> Option<OutputMode> {
        self.env_layer().ok().and_then(|layer| layer.output)
    }

    /// Resolve all layers, `flags` taking the highest precedence.
    pub fn resolve(&self, flags: ConfigLayer) -> Result<EffectiveConfig, ConfigError> {
        let mut layers = Vec::with_capacity(4);

        if let Some(path) = self.global_path.as_deref() {
            if let Some(layer) = load_layer(path)? {
                debug!("global config: {}", path.display());
                layers.push(layer);
            }
        }

        let project_file = find_project_config(&self.working_dir);
        if let Some(path) = project_file.as_deref() {
            if let Some(mut layer) = load_layer(path)? {
                debug!("project config: {}", path.display());
                if layer.access_token.take().is_some() {
                    warn!(
                        "ignoring access_token in project config {}; keep credentials in the global config",
                        path.display()
                    );
                }
                layers.push(layer);
            }
        }

        layers.push(self.env_layer()?);
        layers.push(flags);

        Ok(EffectiveConfig::from_layers(layers, project_file))
    }

    /// Read `PSDB_*` environment variables into a layer.
    fn env_layer(&self) -> Result<ConfigLayer, ConfigError> {
        let mut source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__");
        if let Some(vars) = &self.env {
            source = source.source(Some(vars.clone()));
        }

        let config = Config::builder().add_source(source).build()?;

        let output = match config.get_string("output") {
            Ok(value) if !value.trim().is_empty() => Some(OutputMode::parse(&value)?),
            _ => None,
        };

        Ok(ConfigLayer {
            org: config.get_string("org").ok(),
            database: config.get_string("database").ok(),
            branch: config.get_string("branch").ok(),
            access_token: config.get_string("access_token").ok(),
            output,
            api_url: config.get_string("api_url").ok(),
        }
        .normalized())
    }
}

/// Project-scoped selection persisted by `branch switch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub database: String,
    pub branch: String,
}

impl ProjectConfig {
    /// Replace the project file at `path` with exactly this database/branch pair.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let body = toml::to_string_pretty(self)?;
        replace_file(path, |_| Ok(body))
    }
}

/// Set `org` in the global config file, keeping every other key.
pub fn set_global_org(path: &Path, org: &str) -> Result<(), ConfigError> {
    replace_file(path, |current| {
        let mut layer = match current {
            Some(text) => toml::from_str::<ConfigLayer>(&text).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            None => ConfigLayer::default(),
        };
        layer.org = Some(org.to_string());
        Ok(toml::to_string_pretty(&layer)?)
    })
}

/// Write a template config file. Refuses to clobber an existing file unless `force`.
pub fn write_template(path: &Path, global: bool, force: bool) -> Result<(), ConfigError> {
    replace_file(path, |current| match current {
        Some(_) if !force => Err(ConfigError::Write {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "config file already exists (use --force to overwrite)",
            ),
        }),
        _ => Ok(template(global)),
    })
}

/// Generate a commented template config file.
pub fn template(global: bool) -> String {
    let mut body = String::from(
        r#"# psdb configuration
#
# Locations (by precedence, lowest to highest):
#   Global:  ~/.config/psdb/psdb.toml  (credentials and defaults)
#   Project: .psdb.toml                (nearest one above the working directory)
#   Env:     PSDB_* environment variables
#   Flags:   --org, --database, --branch, --output

# Organization all commands operate in
# org = "my-org"

# Database and branch used by commands that do not name them
# database = "my-db"
# branch = "main"

# Output mode: "human" or "json"
# output = "human"
"#,
    );
    if global {
        body.push_str(
            r#"
# API credential (global config only; ignored in project files)
# access_token = "pscale_tkn_..."

# API endpoint
# api_url = "https://api.planetscale.com/v1"
"#,
        );
    }
    body
}

/// Exclusive advisory lock on a file, released when dropped.
struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(write_err)?;
        file.lock().map_err(write_err)?;
        debug!("locked {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("unlock {}: {}", self.path.display(), e);
        }
    }
}

/// Replace `path` atomically while holding an exclusive lock on it.
///
/// `render` receives the current contents (`None` when the file is new or
/// empty) and returns the new contents. A crash leaves either the old file or
/// the new one, never a partial write.
fn replace_file<F>(path: &Path, render: F) -> Result<(), ConfigError>
where
    F: FnOnce(Option<String>) -> Result<String, ConfigError>,
{
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(write_err)?;

    let existed = path.exists();
    let _lock = FileLock::acquire(path)?;

    let result = write_locked(path, &dir, render);
    if result.is_err() && !existed {
        discard_empty(path);
    }
    result
}

/// Remove a destination the lock created when nothing was written to it.
fn discard_empty(path: &Path) {
    let empty = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
    if empty {
        if let Err(e) = fs::remove_file(path) {
            debug!("remove {}: {}", path.display(), e);
        }
    }
}

fn write_locked<F>(path: &Path, dir: &Path, render: F) -> Result<(), ConfigError>
where
    F: FnOnce(Option<String>) -> Result<String, ConfigError>,
{
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let current = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
        .map(|text| (!text.trim().is_empty()).then_some(text))?;
    let body = render(current)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(body.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(org: Option<&str>, database: Option<&str>) -> ConfigLayer {
        ConfigLayer {
            org: org.map(String::from),
            database: database.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn given_overlay_when_top_sets_field_then_top_wins() {
        let base = layer(Some("base-org"), Some("base-db"));
        let top = layer(Some("top-org"), None);

        let merged = base.overlay(top);

        assert_eq!(merged.org.as_deref(), Some("top-org"));
        assert_eq!(merged.database.as_deref(), Some("base-db"));
    }

    #[test]
    fn given_same_layer_twice_when_overlay_then_result_unchanged() {
        let a = ConfigLayer {
            org: Some("acme".into()),
            output: Some(OutputMode::Json),
            ..Default::default()
        };

        assert_eq!(a.clone().overlay(a.clone()), a);
    }

    #[test]
    fn given_three_layers_when_grouped_differently_then_overlay_is_associative() {
        let a = layer(Some("a"), Some("a-db"));
        let b = layer(None, Some("b-db"));
        let c = layer(Some("c"), None);

        let left = a.clone().overlay(b.clone()).overlay(c.clone());
        let right = a.overlay(b.overlay(c));

        assert_eq!(left, right);
    }

    #[test]
    fn given_blank_strings_when_normalized_then_treated_as_unset() {
        let raw = ConfigLayer {
            org: Some("   ".into()),
            branch: Some(" dev ".into()),
            ..Default::default()
        };

        let normalized = raw.normalized();

        assert_eq!(normalized.org, None);
        assert_eq!(normalized.branch.as_deref(), Some("dev"));
    }

    #[test]
    fn given_no_layers_when_resolving_then_uses_defaults() {
        let config = EffectiveConfig::from_layers(Vec::new(), None);

        assert_eq!(config.organization(), None);
        assert_eq!(config.output(), OutputMode::Human);
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn given_missing_org_when_required_then_error_names_field() {
        let config = EffectiveConfig::from_layers(Vec::new(), None);

        let err = config.require(Field::Organization).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("`organization`"), "{msg}");
        assert!(msg.contains("--org"), "{msg}");
    }

    #[test]
    fn given_env_map_when_resolving_then_env_overrides_nothing_else_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut vars = config::Map::new();
        vars.insert("PSDB_ORG".to_string(), "env-org".to_string());
        vars.insert("PSDB_ACCESS_TOKEN".to_string(), "tkn".to_string());
        vars.insert("PSDB_OUTPUT".to_string(), "JSON".to_string());
        vars.insert("UNRELATED".to_string(), "x".to_string());

        let resolver = Resolver::new(None, dir.path()).with_env(vars);
        let config = resolver.resolve(ConfigLayer::default()).unwrap();

        assert_eq!(config.organization(), Some("env-org"));
        assert_eq!(config.access_token(), Some("tkn"));
        assert_eq!(config.output(), OutputMode::Json);
    }

    #[test]
    fn given_invalid_output_in_env_when_resolving_then_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut vars = config::Map::new();
        vars.insert("PSDB_OUTPUT".to_string(), "yaml".to_string());

        let resolver = Resolver::new(None, dir.path()).with_env(vars);
        let err = resolver.resolve(ConfigLayer::default()).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { key: "output", .. }));
    }

    #[test]
    fn given_new_file_when_render_fails_then_no_empty_file_left() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);

        let err = replace_file(&path, |_| Err(ConfigError::NoConfigDir)).unwrap_err();

        assert!(matches!(err, ConfigError::NoConfigDir));
        assert!(!path.exists());
    }

    #[test]
    fn given_existing_file_when_render_fails_then_file_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        fs::write(&path, "database = \"keep\"\n").unwrap();

        replace_file(&path, |_| Err(ConfigError::NoConfigDir)).unwrap_err();

        assert_eq!(fs::read_to_string(&path).unwrap(), "database = \"keep\"\n");
    }

    #[test]
    fn given_template_when_parsed_then_all_keys_are_commented_out() {
        let layer: ConfigLayer = toml::from_str(&template(true)).unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }
}
