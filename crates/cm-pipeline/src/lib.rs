//! crawlmatch Classification Pipeline
//!
//! Streams crawled requests out of an OpenWPM-style SQLite crawl store,
//! checks each one against every configured block list (alone, and together
//! with the exception list) and writes the matches to an output store in a
//! single transaction.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engines;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod rules;
pub mod sink;
pub mod source;

pub use aggregate::{aggregate, OutputRecord};
pub use classify::{classify, classify_url, ClassificationResult, Verdict};
pub use config::{PipelineConfig, RuleSetConfig};
pub use engines::{build_engines, EnginePair};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use rules::{RuleSet, RuleSources};
pub use sink::{BatchSink, CommitStats, OutputStore};
pub use source::{RequestKind, RequestRecord, RequestSource, RequestStreams, RowStream};
