//! TripleGraph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.triplegraph/config.toml`
//! - Local config: `.triplegraph/config.toml` (next to the data being imported)
//! - CLI overrides via `ConfigOverrides`
//! - Flat key-value parameter bags via [`ImportConfig::from_params`]
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Default number of mapped statements per flush.
pub const DEFAULT_COMMIT_SIZE: u64 = 25_000;

/// Default capacity of the per-batch identity cache.
pub const DEFAULT_NODE_CACHE_SIZE: usize = 10_000;

/// Root configuration for TripleGraph.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TripleGraphConfig {
    /// Statement mapping and batching policy
    pub import: ImportConfig,

    /// Graph store location
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Import policy
// ============================================================================

/// How full IRIs are turned into label, property and relationship names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VocabUriMode {
    /// `prefix__localName`, with prefixes kept in a namespace table
    #[default]
    Shorten,
    /// Local name only
    Ignore,
    /// Explicit IRI → name table, falling back to `Ignore`
    Map,
    /// Full IRI unchanged
    Keep,
}

impl VocabUriMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shorten => "SHORTEN",
            Self::Ignore => "IGNORE",
            Self::Map => "MAP",
            Self::Keep => "KEEP",
        }
    }
}

impl std::fmt::Display for VocabUriMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VocabUriMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SHORTEN" => Ok(Self::Shorten),
            "IGNORE" => Ok(Self::Ignore),
            "MAP" => Ok(Self::Map),
            "KEEP" => Ok(Self::Keep),
            _ => Err(ConfigError::invalid_value(
                "handle_vocab_uris",
                format!(
                    "unknown mode '{}'. Valid values: SHORTEN, IGNORE, MAP, KEEP",
                    s
                ),
            )),
        }
    }
}

/// What happens when a property receives more than one value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultivalMode {
    /// Last value wins
    #[default]
    Overwrite,
    /// Values accumulate into a deduplicated array
    Array,
}

impl std::fmt::Display for MultivalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overwrite => write!(f, "OVERWRITE"),
            Self::Array => write!(f, "ARRAY"),
        }
    }
}

impl std::str::FromStr for MultivalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OVERWRITE" => Ok(Self::Overwrite),
            "ARRAY" => Ok(Self::Array),
            _ => Err(ConfigError::invalid_value(
                "handle_multival",
                format!("unknown mode '{}'. Valid values: OVERWRITE, ARRAY", s),
            )),
        }
    }
}

/// How `rdf:type` statements are materialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RdfTypesMode {
    /// Type becomes a label on the subject node
    #[default]
    Labels,
    /// Type becomes an edge to a node for the class
    Nodes,
    /// Both a label and an edge
    #[serde(alias = "LABELS AND NODES")]
    LabelsAndNodes,
}

impl RdfTypesMode {
    pub fn creates_labels(&self) -> bool {
        matches!(self, Self::Labels | Self::LabelsAndNodes)
    }

    pub fn creates_nodes(&self) -> bool {
        matches!(self, Self::Nodes | Self::LabelsAndNodes)
    }
}

/// Strategy for locating an existing edge before creating or deleting one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeLookup {
    /// Query both degrees, scan the smaller side
    #[default]
    MinDegree,
    /// Always scan outgoing edges of the source node
    Outgoing,
}

/// Number of mapped statements per flush.
///
/// Serialized as an integer, or as the string `"unbounded"` to flush only at
/// end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CommitSizeRepr", into = "CommitSizeRepr")]
pub enum CommitSize {
    Every(u64),
    Unbounded,
}

impl Default for CommitSize {
    fn default() -> Self {
        Self::Every(DEFAULT_COMMIT_SIZE)
    }
}

impl CommitSize {
    /// Whether `pending` mapped statements should trigger a flush.
    pub fn is_reached(&self, pending: u64) -> bool {
        match self {
            Self::Every(limit) => pending >= *limit,
            Self::Unbounded => false,
        }
    }
}

impl std::fmt::Display for CommitSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Every(n) => write!(f, "{}", n),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl std::str::FromStr for CommitSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(Self::Unbounded);
        }
        s.parse::<u64>().map(Self::Every).map_err(|_| {
            ConfigError::invalid_value(
                "commit_size",
                format!("expected a number or 'unbounded', got '{}'", s),
            )
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CommitSizeRepr {
    Count(u64),
    Keyword(String),
}

impl TryFrom<CommitSizeRepr> for CommitSize {
    type Error = ConfigError;

    fn try_from(repr: CommitSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            CommitSizeRepr::Count(n) => Ok(Self::Every(n)),
            CommitSizeRepr::Keyword(s) => s.parse(),
        }
    }
}

impl From<CommitSize> for CommitSizeRepr {
    fn from(size: CommitSize) -> Self {
        match size {
            CommitSize::Every(n) => Self::Count(n),
            CommitSize::Unbounded => Self::Keyword("unbounded".to_string()),
        }
    }
}

/// Mapping and batching policy for one import or delete run.
///
/// # Example TOML
///
/// ```toml
/// [import]
/// handle_vocab_uris = "IGNORE"
/// handle_multival = "ARRAY"
/// multival_prop_list = ["http://schema.org/keywords"]
/// commit_size = "unbounded"
///
/// [import.mappings]
/// "http://schema.org/name" = "title"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    #[serde(alias = "handleVocabUris")]
    pub handle_vocab_uris: VocabUriMode,

    /// Capitalize names per element kind (IGNORE and MAP fallback only)
    #[serde(alias = "applyNeo4jNaming", alias = "applyNamingConvention")]
    pub apply_naming_convention: bool,

    #[serde(alias = "handleMultival")]
    pub handle_multival: MultivalMode,

    /// Properties eligible for ARRAY accumulation; all when absent
    #[serde(alias = "multivalPropList")]
    pub multival_prop_list: Option<BTreeSet<String>>,

    #[serde(alias = "handleRDFTypes", alias = "handleRdfTypes")]
    pub handle_rdf_types: RdfTypesMode,

    /// Append `@lang` to tagged string literals
    #[serde(alias = "keepLangTag")]
    pub keep_lang_tag: bool,

    /// Only keep string literals with this language tag
    #[serde(alias = "languageFilter")]
    pub language_filter: Option<String>,

    /// Keep `value^^datatype` for non-XSD datatypes
    #[serde(alias = "keepCustomDataTypes")]
    pub keep_custom_data_types: bool,

    #[serde(alias = "customDataTypePropList", alias = "customDataTypedPropList")]
    pub custom_data_type_prop_list: Option<BTreeSet<String>>,

    /// Predicates whose statements are skipped entirely
    #[serde(alias = "predicateExclusionList")]
    pub predicate_exclusion_list: Option<BTreeSet<String>>,

    #[serde(alias = "commitSize")]
    pub commit_size: CommitSize,

    #[serde(alias = "nodeCacheSize")]
    pub node_cache_size: usize,

    /// Drop array values whose type differs from the first value
    #[serde(alias = "strictDataTypeCheck")]
    pub strict_data_type_check: bool,

    /// Stop the run on the first failed flush
    #[serde(alias = "abortOnError")]
    pub abort_on_error: bool,

    #[serde(alias = "edgeLookup")]
    pub edge_lookup: EdgeLookup,

    /// IRI → name table used in MAP mode
    pub mappings: BTreeMap<String, String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            handle_vocab_uris: VocabUriMode::default(),
            apply_naming_convention: false,
            handle_multival: MultivalMode::default(),
            multival_prop_list: None,
            handle_rdf_types: RdfTypesMode::default(),
            keep_lang_tag: false,
            language_filter: None,
            keep_custom_data_types: false,
            custom_data_type_prop_list: None,
            predicate_exclusion_list: None,
            commit_size: CommitSize::default(),
            node_cache_size: DEFAULT_NODE_CACHE_SIZE,
            strict_data_type_check: true,
            abort_on_error: true,
            edge_lookup: EdgeLookup::default(),
            mappings: BTreeMap::new(),
        }
    }
}

impl ImportConfig {
    /// Parse and validate a flat key-value parameter bag.
    ///
    /// Keys may use snake_case or the legacy camelCase spelling. Unknown keys
    /// are rejected.
    pub fn from_params(
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(serde_json::Value::Object(params))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_size == CommitSize::Every(0) {
            return Err(ConfigError::invalid_value(
                "commit_size",
                "must be greater than zero",
            ));
        }
        if self.node_cache_size == 0 {
            return Err(ConfigError::invalid_value(
                "node_cache_size",
                "must be greater than zero",
            ));
        }
        if matches!(self.language_filter.as_deref(), Some(lang) if lang.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "language_filter",
                "must not be empty",
            ));
        }
        if self.multival_prop_list.is_some() && self.handle_multival == MultivalMode::Overwrite {
            return Err(ConfigError::ValidationError(
                "multival_prop_list requires handle_multival = ARRAY".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `property` accumulates values instead of overwriting.
    pub fn is_multivalued(&self, property: &str) -> bool {
        self.handle_multival == MultivalMode::Array
            && self
                .multival_prop_list
                .as_ref()
                .is_none_or(|list| list.contains(property))
    }

    /// Whether statements with `predicate` are skipped.
    pub fn is_excluded(&self, predicate: &str) -> bool {
        self.predicate_exclusion_list
            .as_ref()
            .is_some_and(|list| list.contains(predicate))
    }

    /// Whether custom datatypes are retained for `property`.
    pub fn keeps_custom_data_type(&self, property: &str) -> bool {
        self.keep_custom_data_types
            && !matches!(self.handle_vocab_uris, VocabUriMode::Ignore | VocabUriMode::Map)
            && self
                .custom_data_type_prop_list
                .as_ref()
                .is_none_or(|list| list.contains(property))
    }
}

// ============================================================================
// Storage and logging
// ============================================================================

/// Where the graph store lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file (default: `triplegraph.db`)
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("triplegraph.db"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the database path
    pub database: Option<PathBuf>,

    pub handle_vocab_uris: Option<VocabUriMode>,

    pub handle_multival: Option<MultivalMode>,

    pub commit_size: Option<CommitSize>,

    pub node_cache_size: Option<usize>,

    /// Override log level
    pub log_level: Option<String>,
}

impl TripleGraphConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref database) = overrides.database {
            self.storage.database = database.clone();
        }

        if let Some(mode) = overrides.handle_vocab_uris {
            self.import.handle_vocab_uris = mode;
        }

        if let Some(mode) = overrides.handle_multival {
            self.import.handle_multival = mode;
        }

        if let Some(size) = overrides.commit_size {
            self.import.commit_size = size;
        }

        if let Some(size) = overrides.node_cache_size {
            self.import.node_cache_size = size;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import.validate()
    }
}
