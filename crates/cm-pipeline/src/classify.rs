use serde::Serialize;

use crate::engines::EnginePair;
use crate::source::RequestRecord;

/// Outcome of one request against one block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict<'a> {
    pub name: &'a str,
    pub blocked: bool,
    /// Blocked by the list, but excepted once the exception list is added
    pub exception: bool,
}

/// Per-list verdicts for one request, in engine order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult<'a> {
    pub verdicts: Vec<Verdict<'a>>,
}

impl ClassificationResult<'_> {
    /// True if any list's block was excepted.
    pub fn exception_override(&self) -> bool {
        self.verdicts.iter().any(|v| v.exception)
    }

    pub fn any_blocked(&self) -> bool {
        self.verdicts.iter().any(|v| v.blocked)
    }
}

/// Check one URL against every engine pair.
pub fn classify_url<'a>(
    url: &str,
    top_level_url: &str,
    request_type: cm_core::RequestType,
    engines: &'a [EnginePair],
) -> ClassificationResult<'a> {
    let verdicts = engines
        .iter()
        .map(|pair| {
            let blocked = pair
                .blocklist_only
                .check(url, top_level_url, request_type, false)
                .matched;
            // The combined engine only matters for requests the list blocks
            let exception = blocked
                && pair
                    .combined
                    .check(url, top_level_url, request_type, false)
                    .exception;
            Verdict {
                name: &pair.name,
                blocked,
                exception,
            }
        })
        .collect();

    ClassificationResult { verdicts }
}

/// Classify a crawled request.
pub fn classify<'a>(request: &RequestRecord, engines: &'a [EnginePair]) -> ClassificationResult<'a> {
    classify_url(
        &request.target_url,
        &request.top_level_url,
        request.kind.request_type(),
        engines,
    )
}
