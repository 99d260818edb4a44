use crate::classify::ClassificationResult;
use crate::source::{RequestKind, RequestRecord};

/// A matched request as written to the output store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub id: i64,
    pub visit_id: i64,
    pub site_url: String,
    pub target_url: String,
    pub top_level_url: String,
    pub document_url: Option<String>,
    pub kind: RequestKind,
    /// One flag per block list, in configuration order
    pub blocked: Vec<bool>,
    pub exception: bool,
}

impl OutputRecord {
    pub fn is_match(&self) -> bool {
        self.exception || self.blocked.iter().any(|b| *b)
    }
}

/// Fold per-list verdicts into an output record.
///
/// The exception flag is set if any list's block was excepted. Requests no
/// list matched are dropped.
pub fn aggregate(request: RequestRecord, result: &ClassificationResult<'_>) -> Option<OutputRecord> {
    let record = OutputRecord {
        blocked: result.verdicts.iter().map(|v| v.blocked).collect(),
        exception: result.exception_override(),
        id: request.id,
        visit_id: request.visit_id,
        site_url: request.site_url,
        target_url: request.target_url,
        top_level_url: request.top_level_url,
        document_url: request.document_url,
        kind: request.kind,
    };

    record.is_match().then_some(record)
}
