//! Configuration for the CouchDB adapter.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/docbank/docbank.json` (or `.jsonc`)
//! 2. Environment variable: `DOCBANK_CONFIG_CONTENT`
//! 3. Project config: `docbank.json` or `docbank.jsonc` in project directory
//! 4. Environment overrides: `DOCBANK_LOCATION`, `DOCBANK_USERNAME`,
//!    `DOCBANK_PASSWORD`, `DOCBANK_DATABASE`
//!
//! Supports JSONC (JSON with comments) and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Server address used when none is configured.
pub const DEFAULT_LOCATION: &str = "http://localhost:5984";

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Connection settings for a [`crate::CouchDbDatabank`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouchConfig {
    /// Application schema, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Server address.
    pub location: String,

    /// Basic auth user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Drop and recreate the database on the first connect of the process.
    /// Only meant for test runs.
    #[serde(alias = "_clear_database_for_test_run")]
    pub clear_database_for_test_run: bool,

    /// Per-request timeout for the HTTP client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            schema: None,
            location: DEFAULT_LOCATION.to_string(),
            username: None,
            password: None,
            database: None,
            clear_database_for_test_run: false,
            timeout_secs: None,
        }
    }
}

impl CouchConfig {
    /// Config for `database` on the default server.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_test_reset(mut self) -> Self {
        self.clear_database_for_test_run = true;
        self
    }

    /// Whether any credentials are configured.
    pub fn has_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Database name for messages; empty when unset.
    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }

    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/docbank/`
    /// 2. `DOCBANK_CONFIG_CONTENT` environment variable
    /// 3. Project config from `project_dir`
    /// 4. `DOCBANK_*` environment overrides
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let env = |name: &str| std::env::var(name).ok();
        let mut layer = ConfigLayer::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = Self::global_config_dir() {
            if let Some(path) = find_config_file(&global_dir) {
                layer = layer.merge(ConfigLayer::load_file(&path, &env).await?);
                sources.push(path);
            }
        }

        if let Some(content) = env("DOCBANK_CONFIG_CONTENT") {
            layer = layer.merge(ConfigLayer::parse_jsonc(&content, "<env>")?);
        }

        if let Some(dir) = project_dir {
            if let Some(path) = find_config_file(dir) {
                layer = layer.merge(ConfigLayer::load_file(&path, &env).await?);
                sources.push(path);
            }
        }

        layer = layer.merge(ConfigLayer::from_env(&env));
        Ok((layer.into_config(), sources))
    }

    /// Get the global config directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("docbank");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        dirs::config_dir().map(|d| d.join("docbank"))
    }
}

fn find_config_file(dir: &Path) -> Option<PathBuf> {
    ["docbank.jsonc", "docbank.json"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// One configuration source; unset fields defer to earlier sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub schema: Option<Value>,
    pub location: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    #[serde(alias = "_clear_database_for_test_run")]
    pub clear_database_for_test_run: Option<bool>,
    pub timeout_secs: Option<u64>,
}

impl ConfigLayer {
    /// Load a layer from a file, substituting variables with `env`.
    ///
    /// References are resolved inside string values after parsing, so the
    /// substituted text is never read as JSON.
    pub async fn load_file(
        path: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let source = path.display().to_string();
        let content = tokio::fs::read_to_string(path).await?;
        let mut value = parse_jsonc_value(&content, &source)?;
        substitute_variables(&mut value, path, env)?;
        Self::from_value(value, &source)
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> Result<Self, ConfigError> {
        Self::from_value(parse_jsonc_value(content, source)?, source)
    }

    fn from_value(value: Value, source: &str) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| invalid_json(source, e))
    }

    /// The `DOCBANK_*` override variables.
    pub fn from_env(env: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            location: env("DOCBANK_LOCATION"),
            username: env("DOCBANK_USERNAME"),
            password: env("DOCBANK_PASSWORD"),
            database: env("DOCBANK_DATABASE"),
            ..Default::default()
        }
    }

    /// Merge another layer into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            schema: other.schema.or(self.schema),
            location: other.location.or(self.location),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            database: other.database.or(self.database),
            clear_database_for_test_run: other
                .clear_database_for_test_run
                .or(self.clear_database_for_test_run),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
        }
    }

    /// Fill unset fields with defaults.
    pub fn into_config(self) -> CouchConfig {
        let defaults = CouchConfig::default();
        CouchConfig {
            schema: self.schema,
            location: self.location.unwrap_or(defaults.location),
            username: self.username,
            password: self.password,
            database: self.database,
            clear_database_for_test_run: self
                .clear_database_for_test_run
                .unwrap_or(defaults.clear_database_for_test_run),
            timeout_secs: self.timeout_secs,
        }
    }
}

fn invalid_json(source: &str, err: serde_json::Error) -> ConfigError {
    ConfigError::InvalidJson {
        path: source.to_string(),
        message: err.to_string(),
    }
}

fn parse_jsonc_value(content: &str, source: &str) -> Result<Value, ConfigError> {
    serde_json::from_str(&strip_comments(content)).map_err(|e| invalid_json(source, e))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Str,
    StrEscape,
    LineComment,
    BlockComment,
    BlockCommentStar,
}

/// Strip `//` and `/* */` comments outside of strings.
///
/// Newlines inside comments are kept so parse errors report the right line.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = Scan::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        state = match (state, c) {
            (Scan::Code, '/') if chars.peek() == Some(&'/') => {
                chars.next();
                Scan::LineComment
            }
            (Scan::Code, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                Scan::BlockComment
            }
            (Scan::Code, '"') => {
                out.push(c);
                Scan::Str
            }
            (Scan::Code, _) => {
                out.push(c);
                Scan::Code
            }
            (Scan::Str, '\\') => {
                out.push(c);
                Scan::StrEscape
            }
            (Scan::Str, '"') => {
                out.push(c);
                Scan::Code
            }
            (Scan::Str | Scan::StrEscape, _) => {
                out.push(c);
                Scan::Str
            }
            (Scan::LineComment, '\n') => {
                out.push(c);
                Scan::Code
            }
            (Scan::LineComment, _) => Scan::LineComment,
            (Scan::BlockComment | Scan::BlockCommentStar, '*') => Scan::BlockCommentStar,
            (Scan::BlockCommentStar, '/') => Scan::Code,
            (Scan::BlockComment | Scan::BlockCommentStar, '\n') => {
                out.push(c);
                Scan::BlockComment
            }
            (Scan::BlockComment | Scan::BlockCommentStar, _) => Scan::BlockComment,
        };
    }

    out
}

/// Substitute `{env:NAME}` and `{file:path}` references in every string
/// value of a parsed config.
///
/// File paths are relative to the config file.
fn substitute_variables(
    value: &mut Value,
    config_path: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    match value {
        Value::String(text) => {
            if var_regex().is_match(text) {
                *text = substitute_str(text, config_dir, env)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_variables(item, config_path, env)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_variables(item, config_path, env)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_str(
    text: &str,
    config_dir: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for cap in var_regex().captures_iter(text) {
        let (Some(full), Some(kind), Some(name)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };

        let replacement = match kind.as_str() {
            "env" => env(name.as_str()).ok_or_else(|| ConfigError::EnvVarNotFound {
                name: name.as_str().to_string(),
            })?,
            "file" => {
                let file_path = config_dir.join(name.as_str());
                std::fs::read_to_string(&file_path)
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::FileRefNotFound {
                        path: file_path.display().to_string(),
                    })?
            }
            _ => continue,
        };

        out.push_str(&text[last..full.start()]);
        out.push_str(&replacement);
        last = full.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}
