//! `twoway.toml` configuration.
//!
//! ```toml
//! dialect = "postgres"
//! escape_char = "\\"
//! cache_templates = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::{DEFAULT_ESCAPE_CHAR, Dialect};
use crate::error::{TwoWayError, TwoWayResult};

pub const CONFIG_FILE: &str = "twoway.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dialect: Dialect,
    /// Overrides the dialect's LIKE escape character.
    pub escape_char: Option<char>,
    pub cache_templates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            escape_char: None,
            cache_templates: true,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> TwoWayResult<Self> {
        toml::from_str(content).map_err(|e| TwoWayError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> TwoWayResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), dialect = %config.dialect, "loaded config");
        Ok(config)
    }

    /// `./twoway.toml`, then `<config dir>/qail-twoway/config.toml`, then
    /// defaults.
    pub fn load() -> TwoWayResult<Self> {
        match Self::locate() {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|d| d.join("qail-twoway").join("config.toml"))
            .filter(|p| p.exists())
    }

    pub fn escape_char(&self) -> char {
        self.escape_char.unwrap_or(DEFAULT_ESCAPE_CHAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.escape_char(), '\\');
    }

    #[test]
    fn test_parse() {
        let config = Config::from_toml("dialect = \"sqlserver\"\nescape_char = \"$\"\ncache_templates = false\n").unwrap();
        assert_eq!(config.dialect, Dialect::SqlServer);
        assert_eq!(config.escape_char(), '$');
        assert!(!config.cache_templates);
    }

    #[test]
    fn test_bad_dialect() {
        let err = Config::from_toml("dialect = \"db2\"").unwrap_err();
        assert!(matches!(err, TwoWayError::Config(_)));
    }
}
