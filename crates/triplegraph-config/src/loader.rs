//! Layered lookup of import settings.
//!
//! A run sees the user's `~/.triplegraph/config.toml`, then the working
//! directory's `.triplegraph/config.toml`, then whatever the command line
//! overrides. Files are combined as raw TOML tables before any default is
//! filled in: a key written in a later file replaces the earlier one even
//! when it spells out the default, and nested tables such as
//! `[import.mappings]` combine key by key.

use crate::error::ConfigError;
use crate::{ConfigOverrides, TripleGraphConfig};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, trace};

const SETTINGS_FILE: &str = "config.toml";

/// Directory holding the settings file, under the home directory for the
/// user layer and under the working directory for the local one.
const SETTINGS_DIR: &str = ".triplegraph";

/// Resolves the settings for an import run.
///
/// The user layer is read once and kept until [`clear_cache`](Self::clear_cache).
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_dir: Option<PathBuf>,
    user_layer: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader whose user layer lives in `~/.triplegraph`, if a home
    /// directory can be found.
    pub fn new() -> Self {
        Self {
            user_dir: dirs::home_dir().map(|home| home.join(SETTINGS_DIR)),
            user_layer: None,
        }
    }

    /// Loader reading its user layer from `dir` instead of the home directory.
    pub fn with_global_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: Some(dir.into()),
            user_layer: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.user_dir.as_ref().map(|dir| dir.join(SETTINGS_FILE))
    }

    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Settings for an import run started in `root`.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<TripleGraphConfig, ConfigError> {
        let mut layers = Table::new();
        if let Some(user) = self.user_layer()? {
            stack(&mut layers, user);
        }
        if let Some(local) = self.local_layer(root)? {
            stack(&mut layers, local);
        }
        finish(layers, overrides)
    }

    /// Settings from one explicitly named file, ignoring both layers.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<TripleGraphConfig, ConfigError> {
        debug!("Reading settings from {:?}", path);
        finish(read_layer(path)?, overrides)
    }

    /// The user layer on its own, with defaults for everything it leaves out.
    pub fn load_global(&mut self) -> Result<Option<TripleGraphConfig>, ConfigError> {
        let path = self.global_config_path();
        match (self.user_layer()?, path) {
            (Some(layer), Some(path)) => settle(layer)
                .map(Some)
                .map_err(|e| ConfigError::parse_toml(path, e)),
            _ => Ok(None),
        }
    }

    /// The local layer of `root` on its own.
    pub fn load_local(&self, root: &Path) -> Result<Option<TripleGraphConfig>, ConfigError> {
        let path = self.local_config_path(root);
        match self.local_layer(root)? {
            Some(layer) => settle(layer)
                .map(Some)
                .map_err(|e| ConfigError::parse_toml(path, e)),
            None => Ok(None),
        }
    }

    /// Write `config` in full as the local layer of `root`.
    pub fn save_local(&self, root: &Path, config: &TripleGraphConfig) -> Result<(), ConfigError> {
        write_settings(&self.local_config_path(root), config)
    }

    /// Give `root` a local settings file holding the defaults, leaving an
    /// existing one alone. Returns the file's path.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        let path = self.local_config_path(root);
        if path.exists() {
            debug!("Keeping existing settings at {:?}", path);
        } else {
            write_settings(&path, &TripleGraphConfig::default())?;
        }
        Ok(path)
    }

    /// Forget the user layer so the next load reads it again.
    pub fn clear_cache(&mut self) {
        self.user_layer = None;
    }

    fn user_layer(&mut self) -> Result<Option<Table>, ConfigError> {
        if let Some(layer) = &self.user_layer {
            return Ok(Some(layer.clone()));
        }
        let Some(path) = self.global_config_path() else {
            debug!("No home directory, no user settings");
            return Ok(None);
        };
        if !path.exists() {
            trace!("No user settings at {:?}", path);
            return Ok(None);
        }

        debug!("Reading user settings from {:?}", path);
        let layer = read_layer(&path)?;
        self.user_layer = Some(layer.clone());
        Ok(Some(layer))
    }

    fn local_layer(&self, root: &Path) -> Result<Option<Table>, ConfigError> {
        let path = self.local_config_path(root);
        if !path.exists() {
            trace!("No local settings at {:?}", path);
            return Ok(None);
        }
        debug!("Reading local settings from {:?}", path);
        read_layer(&path).map(Some)
    }
}

/// Read one settings file as a raw table.
///
/// The table is also checked against the settings schema here, so a typo
/// is reported against the file it came from rather than the merged result.
fn read_layer(path: &Path) -> Result<Table, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let layer: Table = text.parse().map_err(|e| ConfigError::parse_toml(path, e))?;
    settle(layer.clone()).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(layer)
}

/// Lay `upper` over `lower`. Tables present in both combine recursively;
/// any other key in `upper` replaces the one below it.
fn stack(lower: &mut Table, upper: Table) {
    for (key, value) in upper {
        match (lower.get_mut(&key), value) {
            (Some(Value::Table(below)), Value::Table(above)) => stack(below, above),
            (_, value) => {
                lower.insert(key, value);
            }
        }
    }
}

/// Fill in defaults for everything the layers left out.
fn settle(layers: Table) -> Result<TripleGraphConfig, toml::de::Error> {
    Value::Table(layers).try_into()
}

fn finish(
    layers: Table,
    overrides: Option<&ConfigOverrides>,
) -> Result<TripleGraphConfig, ConfigError> {
    let mut config = settle(layers).map_err(ConfigError::Layering)?;
    if let Some(overrides) = overrides {
        config.apply_overrides(overrides);
    }
    config.validate()?;
    Ok(config)
}

fn write_settings(path: &Path, config: &TripleGraphConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.exists()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|e| ConfigError::write_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommitSize, LogFormat, MultivalMode, VocabUriMode};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_local(root: &Path, content: &str) -> PathBuf {
        let dir = root.join(".triplegraph");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_user(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("user"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config, TripleGraphConfig::default());
    }

    #[test]
    fn test_local_file_is_read() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("user"));

        write_local(
            temp.path(),
            r#"
            [import]
            handle_vocab_uris = "IGNORE"
            commit_size = 100

            [import.mappings]
            "http://schema.org/name" = "title"

            [storage]
            database = "local.db"
            "#,
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.import.handle_vocab_uris, VocabUriMode::Ignore);
        assert_eq!(config.import.commit_size, CommitSize::Every(100));
        assert_eq!(
            config.import.mappings.get("http://schema.org/name"),
            Some(&"title".to_string())
        );
        assert_eq!(config.storage.database, PathBuf::from("local.db"));
    }

    #[test]
    fn test_local_refines_user_layer() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");

        write_user(
            &user_dir,
            r#"
            [logging]
            level = "debug"

            [import]
            handle_multival = "ARRAY"
            commit_size = 10
            "#,
        );
        write_local(
            temp.path(),
            r#"
            [import]
            commit_size = "unbounded"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.import.commit_size, CommitSize::Unbounded);
        assert_eq!(config.import.handle_multival, MultivalMode::Array);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_local_can_restore_default_policy() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");

        write_user(
            &user_dir,
            r#"
            [import]
            handle_multival = "ARRAY"
            handle_vocab_uris = "KEEP"
            commit_size = 10
            abort_on_error = false

            [storage]
            database = "shared.db"
            "#,
        );
        write_local(
            temp.path(),
            r#"
            [import]
            handle_multival = "OVERWRITE"
            handle_vocab_uris = "SHORTEN"
            commit_size = 25000
            abort_on_error = true

            [storage]
            database = "triplegraph.db"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config, TripleGraphConfig::default());
    }

    #[test]
    fn test_log_format_survives_local_file() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");

        write_user(
            &user_dir,
            r#"
            [logging]
            format = "json"
            "#,
        );
        write_local(
            temp.path(),
            r#"
            [logging]
            level = "warn"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "warn");

        write_local(
            temp.path(),
            r#"
            [logging]
            format = "text"
            "#,
        );
        let config = loader.load(temp.path(), None).unwrap();
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_mappings_combine_across_layers() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");

        write_user(
            &user_dir,
            r#"
            [import.mappings]
            "http://a.org/x" = "x"
            "http://a.org/y" = "old"
            "#,
        );
        write_local(
            temp.path(),
            r#"
            [import.mappings]
            "http://a.org/y" = "y"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.import.mappings.len(), 2);
        assert_eq!(config.import.mappings["http://a.org/y"], "y");
    }

    #[test]
    fn test_overrides_win_over_files() {
        let temp = TempDir::new().unwrap();
        write_local(
            temp.path(),
            r#"
            [import]
            commit_size = 100
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("user"));
        let overrides = ConfigOverrides {
            commit_size: Some(CommitSize::Every(3)),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.import.commit_size, CommitSize::Every(3));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_out_of_range_value_fails_validation() {
        let temp = TempDir::new().unwrap();
        write_local(
            temp.path(),
            r#"
            [import]
            node_cache_size = 0
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("user"));
        assert!(matches!(
            loader.load(temp.path(), None),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_misspelled_key_names_its_file() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");
        write_user(
            &user_dir,
            r#"
            [import]
            comit_size = 10
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        match loader.load(temp.path(), None) {
            Err(ConfigError::ParseToml { path, .. }) => {
                assert_eq!(path, user_dir.join("config.toml"))
            }
            other => panic!("expected a parse error, got {other:?}"),
        }

        let path = write_local(temp.path(), "[import]\ncomit_size = 10\n");
        let err = loader.load_file(&path, None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn test_saved_settings_load_back() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("user"));

        let mut config = TripleGraphConfig::default();
        config.import.handle_vocab_uris = VocabUriMode::Keep;
        config.logging.level = "warn".to_string();
        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("user"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded.import.handle_vocab_uris, VocabUriMode::Keep);
        assert_eq!(loaded.logging.level, "warn");
        assert_eq!(loader.load_local(temp.path()).unwrap(), Some(loaded));
    }

    #[test]
    fn test_init_local_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("user"));

        let path = loader.init_local(temp.path()).unwrap();
        assert!(path.ends_with(".triplegraph/config.toml"));
        let written = std::fs::read_to_string(&path).unwrap();
        let _: TripleGraphConfig = toml::from_str(&written).unwrap();

        std::fs::write(&path, "[logging]\nlevel = \"error\"\n").unwrap();
        loader.init_local(temp.path()).unwrap();
        let config = loader.load_local(temp.path()).unwrap().unwrap();
        assert_eq!(config.logging.level, "error");
    }

    #[test]
    fn test_user_layer_is_cached_until_cleared() {
        let temp = TempDir::new().unwrap();
        let user_dir = temp.path().join("user");
        write_user(&user_dir, "[logging]\nlevel = \"debug\"\n");

        let mut loader = ConfigLoader::with_global_dir(&user_dir);
        assert_eq!(loader.load_global().unwrap().unwrap().logging.level, "debug");

        write_user(&user_dir, "[logging]\nlevel = \"warn\"\n");
        assert_eq!(loader.load_global().unwrap().unwrap().logging.level, "debug");

        loader.clear_cache();
        assert!(loader.user_layer.is_none());
        assert_eq!(loader.load_global().unwrap().unwrap().logging.level, "warn");
    }
}
