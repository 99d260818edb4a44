//! Network rules in their evaluated form.

use regex::Regex;

use crate::pattern::Pattern;
use crate::psl::host_matches_domain;
use crate::types::{DomainConstraint, PartyMask, RequestContext, RequestType, RuleAction, RuleFlags};

/// How a rule recognises a URL.
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// `||host^` - the request host is `host` or a subdomain of it
    Host(String),
    /// URL pattern program
    Pattern(Pattern),
    /// `/regex/`
    Regex(Regex),
}

/// Where an exception rule is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Against the request URL and its options.
    Request,
    /// Against the top-level page URL; allowlists every request on the page.
    Page,
}

/// A single network rule, ready for matching.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    pub action: RuleAction,
    pub flags: RuleFlags,
    /// Empty mask means any type
    pub type_mask: RequestType,
    /// Empty mask means either party
    pub party_mask: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
    pub matcher: RuleMatcher,
    /// Original filter text, reported with extra match info
    pub raw: String,
}

impl NetworkRule {
    pub fn is_important(&self) -> bool {
        self.flags.contains(RuleFlags::IMPORTANT)
    }

    /// `$document` exceptions and untyped exceptions whose whole pattern is
    /// a hostname (`@@example.com^`) allowlist whole pages; all other
    /// exceptions apply to single requests.
    pub fn scope(&self) -> RuleScope {
        if self.action != RuleAction::Allow {
            return RuleScope::Request;
        }
        if self.type_mask.contains(RequestType::MAIN_FRAME) {
            return RuleScope::Page;
        }

        match &self.matcher {
            RuleMatcher::Pattern(pattern) if self.type_mask.is_empty() && pattern.is_bare_hostname() => {
                RuleScope::Page
            }
            _ => RuleScope::Request,
        }
    }

    /// Check options and the URL matcher against a request.
    pub fn matches(&self, ctx: &RequestContext<'_>) -> bool {
        self.check_options(ctx) && self.check_domain_constraints(ctx.site_host) && self.check_url(ctx)
    }

    /// Check a page-scoped rule against a top-level page.
    ///
    /// Type and party options do not apply to pages.
    pub fn matches_page(&self, ctx: &RequestContext<'_>) -> bool {
        self.check_domain_constraints(ctx.site_host) && self.check_url(ctx)
    }

    fn check_options(&self, ctx: &RequestContext<'_>) -> bool {
        if !self.type_mask.is_empty() && !self.type_mask.intersects(ctx.request_type) {
            return false;
        }

        if !self.party_mask.is_empty() {
            if let Some(third_party) = ctx.is_third_party {
                let party = if third_party {
                    PartyMask::THIRD_PARTY
                } else {
                    PartyMask::FIRST_PARTY
                };
                if !self.party_mask.intersects(party) {
                    return false;
                }
            }
        }

        true
    }

    fn check_domain_constraints(&self, site_host: &str) -> bool {
        let constraints = match &self.domain_constraints {
            Some(c) => c,
            None => return true,
        };

        if !constraints.include.is_empty()
            && !constraints.include.iter().any(|d| host_matches_domain(site_host, d))
        {
            return false;
        }

        !constraints.exclude.iter().any(|d| host_matches_domain(site_host, d))
    }

    fn check_url(&self, ctx: &RequestContext<'_>) -> bool {
        let url = if self.flags.contains(RuleFlags::MATCH_CASE) {
            ctx.url
        } else {
            ctx.url_lower
        };

        match &self.matcher {
            RuleMatcher::Host(domain) => host_matches_domain(ctx.req_host, domain),
            RuleMatcher::Pattern(pattern) => pattern.is_match(url),
            RuleMatcher::Regex(regex) => regex.is_match(url),
        }
    }
}
