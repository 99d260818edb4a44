//! crawlmatch Filter List Compiler
//!
//! This crate turns ABP/uBO filter lists into [`cm_core::Engine`]s:
//! text is parsed into [`CompiledRule`]s, optimized (`$badfilter`,
//! duplicates) and built into indexed rule tables.

pub mod error;
pub mod parser;
pub mod optimizer;
pub mod builder;

use cm_core::Engine;

pub use builder::{build_engine, build_rule};
pub use error::{CompileError, CompileErrorKind};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_filter_lines, parse_filter_list, CompiledRule};

/// Compile filter list lines into a matching engine.
///
/// Fails on the first malformed rule.
pub fn compile<I, S>(lines: I) -> Result<Engine, CompileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rules = parse_filter_lines(lines)?;
    optimize_rules(&mut rules);
    build_engine(&rules)
}
