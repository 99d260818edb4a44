//! Core Matching Engine
//!
//! Every classified request goes through here, usually twice per rule set.
//! Rules are split by role into three tables, each indexed so that only a
//! handful of candidates is verified per request.

use std::collections::{HashMap, HashSet};

use crate::psl::{is_third_party, walk_host_suffixes};
use crate::rule::{NetworkRule, RuleMatcher, RuleScope};
use crate::types::{MatchResult, RequestContext, RequestType, RuleAction};
use crate::url::{extract_host, tokenize_url};

// =============================================================================
// Rule Table
// =============================================================================

/// Rules of one role with their lookup indexes.
#[derive(Debug)]
struct RuleTable {
    scope: RuleScope,
    rules: Vec<NetworkRule>,
    /// `||host^` rules keyed by host
    host_index: HashMap<String, Vec<u32>>,
    /// Pattern rules keyed by their index token
    token_index: HashMap<String, Vec<u32>>,
    /// Rules without a usable token; always verified
    fallback: Vec<u32>,
}

impl RuleTable {
    fn new(scope: RuleScope) -> Self {
        Self {
            scope,
            rules: Vec::new(),
            host_index: HashMap::new(),
            token_index: HashMap::new(),
            fallback: Vec::new(),
        }
    }

    fn insert(&mut self, rule: NetworkRule) {
        let id = self.rules.len() as u32;
        match &rule.matcher {
            RuleMatcher::Host(host) => {
                self.host_index.entry(host.clone()).or_default().push(id);
            }
            RuleMatcher::Pattern(pattern) => match pattern.index_token() {
                Some(token) => self.token_index.entry(token).or_default().push(id),
                None => self.fallback.push(id),
            },
            RuleMatcher::Regex(_) => self.fallback.push(id),
        }
        self.rules.push(rule);
    }

    fn candidates(&self, ctx: &RequestContext<'_>) -> Vec<u32> {
        let mut candidates = Vec::new();

        if !self.host_index.is_empty() {
            for suffix in walk_host_suffixes(ctx.req_host) {
                if let Some(ids) = self.host_index.get(suffix) {
                    candidates.extend_from_slice(ids);
                }
            }
        }

        if !self.token_index.is_empty() {
            let tokens: HashSet<&str> = tokenize_url(ctx.url_lower).into_iter().collect();
            for token in tokens {
                if let Some(ids) = self.token_index.get(token) {
                    candidates.extend_from_slice(ids);
                }
            }
        }

        candidates.extend_from_slice(&self.fallback);
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    /// Find the deciding rule: the first `$important` match, otherwise the
    /// first match in list order.
    fn best_match(&self, ctx: &RequestContext<'_>) -> Option<&NetworkRule> {
        let mut first = None;

        for id in self.candidates(ctx) {
            let rule = &self.rules[id as usize];
            let matched = match self.scope {
                RuleScope::Request => rule.matches(ctx),
                RuleScope::Page => rule.matches_page(ctx),
            };
            if !matched {
                continue;
            }
            if rule.is_important() {
                return Some(rule);
            }
            if first.is_none() {
                first = Some(rule);
            }
        }

        first
    }
}

// =============================================================================
// Engine
// =============================================================================

/// A compiled, read-only matching engine.
#[derive(Debug)]
pub struct Engine {
    blocks: RuleTable,
    request_exceptions: RuleTable,
    page_exceptions: RuleTable,
}

impl Engine {
    /// Build an engine from evaluated rules, keeping their order.
    pub fn new(rules: impl IntoIterator<Item = NetworkRule>) -> Self {
        let mut engine = Self {
            blocks: RuleTable::new(RuleScope::Request),
            request_exceptions: RuleTable::new(RuleScope::Request),
            page_exceptions: RuleTable::new(RuleScope::Page),
        };

        for rule in rules {
            match (rule.action, rule.scope()) {
                (RuleAction::Block, _) => engine.blocks.insert(rule),
                (RuleAction::Allow, RuleScope::Request) => engine.request_exceptions.insert(rule),
                (RuleAction::Allow, RuleScope::Page) => engine.page_exceptions.insert(rule),
            }
        }

        log::debug!(
            "engine built: {} block, {} request exception, {} page exception rules",
            engine.blocks.rules.len(),
            engine.request_exceptions.rules.len(),
            engine.page_exceptions.rules.len(),
        );

        engine
    }

    /// Total number of rules in the engine.
    pub fn rule_count(&self) -> usize {
        self.blocks.rules.len() + self.request_exceptions.rules.len() + self.page_exceptions.rules.len()
    }

    /// Check a request URL loaded on a top-level page.
    ///
    /// With `collect_extra_info` the raw text of the deciding rules is
    /// returned as well.
    pub fn check(
        &self,
        url: &str,
        top_level_url: &str,
        request_type: RequestType,
        collect_extra_info: bool,
    ) -> MatchResult {
        let url_lower = url.to_ascii_lowercase();
        let page_lower = top_level_url.to_ascii_lowercase();
        let req_host = extract_host(&url_lower).unwrap_or("");
        let site_host = extract_host(&page_lower).unwrap_or("");

        let is_third_party = if req_host.is_empty() || site_host.is_empty() {
            None
        } else {
            Some(is_third_party(site_host, req_host))
        };

        let ctx = RequestContext {
            url,
            url_lower: &url_lower,
            req_host,
            site_host,
            is_third_party,
            request_type,
        };

        let page_ctx = RequestContext {
            url: top_level_url,
            url_lower: &page_lower,
            req_host: site_host,
            site_host,
            is_third_party: Some(false),
            request_type: RequestType::MAIN_FRAME,
        };

        self.match_request(&ctx, &page_ctx, collect_extra_info)
    }

    fn match_request(
        &self,
        ctx: &RequestContext<'_>,
        page_ctx: &RequestContext<'_>,
        collect_extra_info: bool,
    ) -> MatchResult {
        let block = match self.blocks.best_match(ctx) {
            Some(rule) => rule,
            None => return MatchResult::default(),
        };

        // $important blocks ignore exceptions
        let exception = if block.is_important() {
            None
        } else {
            self.request_exceptions
                .best_match(ctx)
                .or_else(|| self.page_exceptions.best_match(page_ctx))
        };

        let raw = |rule: &NetworkRule| collect_extra_info.then(|| rule.raw.clone());

        MatchResult {
            matched: exception.is_none(),
            exception: exception.is_some(),
            filter: raw(block),
            exception_filter: exception.and_then(raw),
        }
    }
}
