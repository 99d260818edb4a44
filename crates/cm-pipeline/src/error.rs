use std::path::PathBuf;

use thiserror::Error;

use cm_compiler::CompileError;

/// Pipeline errors. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read rule list `{name}` from {path}: {source}")]
    RuleRead {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile rule list `{name}`: {source}")]
    RuleCompile {
        name: String,
        #[source]
        source: CompileError,
    },

    #[error("failed to open crawl database {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read `{query}` rows: {source}")]
    SourceStream {
        query: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to open output database {path}: {source}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("output transaction failed: {0}")]
    SinkTransaction(#[source] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reader thread failed: {0}")]
    Reader(String),

    #[error("commit task failed: {0}")]
    CommitTask(String),
}

pub type Result<T> = std::result::Result<T, Error>;
