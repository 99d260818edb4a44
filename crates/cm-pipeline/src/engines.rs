//! Engine pairs
//!
//! Each block list gets two engines: one built from the list alone, and one
//! that also carries the exception list. The first decides whether a request
//! is blocked; the second only whether that block is excepted.

use cm_compiler::{build_engine, optimize_rules, parse_filter_list, CompiledRule};
use cm_core::Engine;

use crate::error::{Error, Result};
use crate::rules::{RuleSet, RuleSources};

#[derive(Debug)]
pub struct EnginePair {
    pub name: String,
    pub blocklist_only: Engine,
    pub combined: Engine,
}

impl EnginePair {
    /// Build both engines from already parsed rules.
    fn build(name: &str, block_rules: &[CompiledRule], exception_rules: &[CompiledRule]) -> Result<Self> {
        let compile_err = |source| Error::RuleCompile {
            name: name.to_string(),
            source,
        };

        let mut blocklist_rules = block_rules.to_vec();
        optimize_rules(&mut blocklist_rules);
        let blocklist_only = build_engine(&blocklist_rules).map_err(compile_err)?;

        let mut combined_rules = Vec::with_capacity(block_rules.len() + exception_rules.len());
        combined_rules.extend_from_slice(block_rules);
        combined_rules.extend_from_slice(exception_rules);
        optimize_rules(&mut combined_rules);
        let combined = build_engine(&combined_rules).map_err(compile_err)?;

        Ok(Self {
            name: name.to_string(),
            blocklist_only,
            combined,
        })
    }
}

fn parse(list: &RuleSet) -> Result<Vec<CompiledRule>> {
    parse_filter_list(&list.text).map_err(|source| Error::RuleCompile {
        name: list.name.clone(),
        source,
    })
}

/// Compile every block list into an engine pair, in configuration order.
pub fn build_engines(sources: &RuleSources) -> Result<Vec<EnginePair>> {
    let exception_rules = parse(&sources.exception_list)?;
    log::info!(
        "exception list `{}`: {} rules",
        sources.exception_list.name,
        exception_rules.len()
    );

    let mut engines = Vec::with_capacity(sources.block_lists.len());
    for list in &sources.block_lists {
        let block_rules = parse(list)?;
        let pair = EnginePair::build(&list.name, &block_rules, &exception_rules)?;
        log::info!(
            "block list `{}`: {} rules ({} with exceptions)",
            list.name,
            pair.blocklist_only.rule_count(),
            pair.combined.rule_count()
        );
        engines.push(pair);
    }

    Ok(engines)
}
