//! crawlmatch Core Library
//!
//! This crate provides the request matching engine used to classify crawled
//! requests against ad- and tracker-blocking filter lists.
//!
//! # Architecture
//!
//! Filter lists are compiled (by `cm-compiler`) into [`NetworkRule`]s, which an
//! [`Engine`] splits into block rules, request-scoped exceptions and
//! page-scoped exceptions. Each group is indexed by host and by URL token so a
//! lookup only verifies a few candidate rules. Engines are immutable once
//! built and can be shared freely between threads.
//!
//! # Modules
//!
//! - `psl`: eTLD+1 extraction and host suffix walking
//! - `url`: Fast URL helpers without allocations
//! - `pattern`: Compiled URL pattern programs
//! - `rule`: Network rules and their option checks
//! - `matcher`: The indexed matching engine
//! - `types`: Shared type definitions

pub mod psl;
pub mod types;
pub mod url;
pub mod pattern;
pub mod rule;
pub mod matcher;

// Re-export commonly used types
pub use psl::{get_etld1, is_third_party};
pub use pattern::{AnchorType, Pattern};
pub use rule::{NetworkRule, RuleMatcher, RuleScope};
pub use matcher::Engine;
pub use types::{DomainConstraint, MatchResult, PartyMask, RequestContext, RequestType, RuleAction, RuleFlags};
