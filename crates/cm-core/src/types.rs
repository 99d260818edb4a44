//! Core type definitions for crawlmatch
//!
//! These types are shared by the compiler (which produces rules) and the
//! matching engine (which evaluates them).

// =============================================================================
// Rule Actions
// =============================================================================

/// Action taken by a network rule when it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the request
    Allow = 0,
    /// Block rule - cancels the request
    Block = 1,
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u16 {
        /// $important - ignores exception filters
        const IMPORTANT = 1 << 0;
        /// Pattern is a regex
        const IS_REGEX = 1 << 1;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 2;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 7;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 8;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 9;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;
        const CSP_REPORT = 1 << 12;
        const BEACON = 1 << 13;
        const FETCH = 1 << 14;

        /// All request types
        const ALL = 0x7FFF;
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask. Empty means "either".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Domain Constraints
// =============================================================================

/// `$domain=` option: the page host must fall under one of `include` (when
/// non-empty) and under none of `exclude`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainConstraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Lowercased request URL, used by case-insensitive rules
    pub url_lower: &'a str,
    /// Request hostname (lowercase)
    pub req_host: &'a str,
    /// Top-level page hostname (lowercase, may be empty)
    pub site_host: &'a str,
    /// `None` when the page host is unknown
    pub is_third_party: Option<bool>,
    /// Request type
    pub request_type: RequestType,
}

// =============================================================================
// Match Result
// =============================================================================

/// Result of checking a request against an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// A block rule applies and no exception overrides it.
    pub matched: bool,
    /// A block rule applies but an exception rule overrides it.
    pub exception: bool,
    /// Raw text of the deciding block rule (only with extra info).
    pub filter: Option<String>,
    /// Raw text of the overriding exception rule (only with extra info).
    pub exception_filter: Option<String>,
}
