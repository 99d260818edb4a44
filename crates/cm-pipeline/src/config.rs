//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields the stock EasyList/EasyPrivacy setup over local files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named rule list on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    /// Also the output column name
    pub name: String,
    pub path: PathBuf,
}

impl RuleSetConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub crawl_db: PathBuf,
    pub output_db: PathBuf,
    pub block_lists: Vec<RuleSetConfig>,
    pub exception_list: RuleSetConfig,
    /// Rows between progress lines
    pub progress_interval: u64,
    /// Per-stream row buffer
    pub channel_capacity: usize,
    /// Expected row count for progress; counted from the crawl store if unset
    pub expected_total: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crawl_db: PathBuf::from("crawl_results.sqlite"),
            output_db: PathBuf::from("crawl_adblock.sqlite"),
            block_lists: vec![
                RuleSetConfig::new("easylist", "easylist.txt"),
                RuleSetConfig::new("easyprivacy", "easyprivacy.txt"),
            ],
            exception_list: RuleSetConfig::new("exceptionlist", "exceptionrules.txt"),
            progress_interval: 500,
            channel_capacity: 256,
            expected_total: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check rule-set names, which double as SQL column names.
    pub fn validate(&self) -> Result<()> {
        if self.block_lists.is_empty() {
            return Err(Error::Config("at least one block list is required".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be positive".into()));
        }

        let mut seen = HashSet::new();
        for name in self.rule_set_names() {
            if !is_valid_column_name(name) {
                return Err(Error::Config(format!(
                    "rule set name `{}` must match [a-z_][a-z0-9_]*",
                    name
                )));
            }
            if RESERVED_COLUMNS.contains(&name) {
                return Err(Error::Config(format!("rule set name `{}` is reserved", name)));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate rule set name `{}`", name)));
            }
        }

        Ok(())
    }

    /// Block list names followed by the exception list name.
    pub fn rule_set_names(&self) -> impl Iterator<Item = &str> {
        self.block_lists
            .iter()
            .map(|list| list.name.as_str())
            .chain(std::iter::once(self.exception_list.name.as_str()))
    }
}

const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "visit_id",
    "site_url",
    "url",
    "script_url",
    "document_url",
    "top_level_url",
];

fn is_valid_column_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_lowercase() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.rule_set_names().collect::<Vec<_>>(),
            vec!["easylist", "easyprivacy", "exceptionlist"]
        );
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"crawl_db": "crawl.sqlite", "progress_interval": 10}"#).unwrap();
        assert_eq!(config.crawl_db, PathBuf::from("crawl.sqlite"));
        assert_eq!(config.progress_interval, 10);
        assert_eq!(config.block_lists.len(), 2);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn rejects_bad_names() {
        let bad = r#"{"block_lists": [{"name": "Easy-List", "path": "a.txt"}]}"#;
        assert!(matches!(PipelineConfig::from_json(bad), Err(Error::Config(_))));

        let dup = r#"{"block_lists": [{"name": "a", "path": "a.txt"}, {"name": "a", "path": "b.txt"}]}"#;
        assert!(matches!(PipelineConfig::from_json(dup), Err(Error::Config(_))));

        let clash = r#"{"exception_list": {"name": "easylist", "path": "x.txt"}}"#;
        assert!(matches!(PipelineConfig::from_json(clash), Err(Error::Config(_))));

        let reserved = r#"{"block_lists": [{"name": "url", "path": "a.txt"}]}"#;
        assert!(matches!(PipelineConfig::from_json(reserved), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(PipelineConfig::from_json("{"), Err(Error::Config(_))));
    }

    #[test]
    fn column_names() {
        assert!(is_valid_column_name("easylist"));
        assert!(is_valid_column_name("_list2"));
        assert!(!is_valid_column_name("2list"));
        assert!(!is_valid_column_name(""));
        assert!(!is_valid_column_name("list;drop"));
    }
}
