//! Repository configuration read from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryOptions;
use crate::schema::{SystemField, SystemFields, SystemSource};
use crate::synth::Dialect;

/// Errors raised while reading configuration or definition files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The TOML did not parse.
    #[error("failed to parse config{}: {source}", .path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// File path, when read from disk.
        path: Option<PathBuf>,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[dialect]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// Whether large fields map to streamed columns.
    pub lob_streaming: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self { lob_streaming: true }
    }
}

/// `[query]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Folder id lists longer than this use a temporary id set.
    pub max_inline_ids: usize,
    /// Maximum where-expression nesting.
    pub max_predicate_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let defaults = QueryOptions::default();
        Self {
            max_inline_ids: defaults.max_inline_ids,
            max_predicate_depth: defaults.max_predicate_depth,
        }
    }
}

/// `[loader]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Summary cache entries; `0` disables the cache.
    pub summary_cache_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            summary_cache_capacity: 1024,
        }
    }
}

/// `[logging]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: false,
        }
    }
}

/// Top-level repository configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Row-class synthesis dialect.
    pub dialect: DialectConfig,
    /// Query pipeline tunables.
    pub query: QueryConfig,
    /// Loader tunables.
    pub loader: LoaderConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Replaces the standard system field set when present.
    pub system_fields: Option<Vec<SystemField>>,
}

impl RepositoryConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and system field declarations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.max_predicate_depth == 0 {
            return Err(ConfigError::Invalid(
                "query.max_predicate_depth must be at least 1".into(),
            ));
        }
        if let Some(fields) = &self.system_fields {
            if fields.is_empty() {
                return Err(ConfigError::Invalid(
                    "system_fields must not be empty when present".into(),
                ));
            }
            for (idx, field) in fields.iter().enumerate() {
                if field.name.is_empty() || field.column.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "system_fields[{idx}] needs a name and a column"
                    )));
                }
                if fields[..idx].iter().any(|f| f.name == field.name) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate system field '{}'",
                        field.name
                    )));
                }
            }
            if !fields.iter().any(|f| f.source == SystemSource::Row) {
                return Err(ConfigError::Invalid(
                    "system_fields needs at least one row-sourced field".into(),
                ));
            }
        }
        Ok(())
    }

    /// Synthesis dialect.
    pub fn dialect(&self) -> Dialect {
        Dialect {
            lob_streaming: self.dialect.lob_streaming,
        }
    }

    /// Query pipeline options.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            max_inline_ids: self.query.max_inline_ids,
            max_predicate_depth: self.query.max_predicate_depth,
        }
    }

    /// Configured system fields, or the standard set.
    pub fn system_fields(&self) -> SystemFields {
        match &self.system_fields {
            Some(fields) => SystemFields::from_fields(fields.clone()),
            None => SystemFields::standard(),
        }
    }
}
