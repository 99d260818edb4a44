use thiserror::Error;

/// A malformed filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}: `{rule}`")]
pub struct CompileError {
    /// 1-based line number within the list
    pub line: usize,
    /// The offending rule text
    pub rule: String,
    pub kind: CompileErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
    #[error("options exclude every request type")]
    EmptyTypeMask,
    #[error("options exclude both first and third party")]
    EmptyPartyMask,
    #[error("invalid regular expression ({0})")]
    InvalidRegex(String),
}
