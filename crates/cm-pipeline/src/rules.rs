use crate::config::{PipelineConfig, RuleSetConfig};
use crate::error::{Error, Result};

/// Raw text of one named rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    pub name: String,
    pub text: String,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Read a rule list from disk.
    pub fn read(config: &RuleSetConfig) -> Result<Self> {
        let text = std::fs::read_to_string(&config.path).map_err(|source| Error::RuleRead {
            name: config.name.clone(),
            path: config.path.clone(),
            source,
        })?;
        log::debug!("read rule list `{}` from {}", config.name, config.path.display());
        Ok(Self::new(config.name.clone(), text))
    }
}

/// All rule lists of a run.
#[derive(Debug, Clone)]
pub struct RuleSources {
    pub block_lists: Vec<RuleSet>,
    pub exception_list: RuleSet,
}

impl RuleSources {
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let block_lists = config
            .block_lists
            .iter()
            .map(RuleSet::read)
            .collect::<Result<Vec<_>>>()?;
        let exception_list = RuleSet::read(&config.exception_list)?;

        Ok(Self {
            block_lists,
            exception_list,
        })
    }
}
