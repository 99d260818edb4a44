use std::collections::HashSet;

use cm_core::pattern::AnchorType;
use cm_core::types::{DomainConstraint, PartyMask, RequestType, RuleAction, RuleFlags};

use crate::parser::CompiledRule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Apply `$badfilter` cancellations and drop duplicate rules, keeping the
/// first occurrence of each.
pub fn optimize_rules(rules: &mut Vec<CompiledRule>) -> OptimizeStats {
    let before = rules.len();

    let badfilter_keys: HashSet<RuleKey<'_>> = rules
        .iter()
        .filter(|rule| rule.is_badfilter)
        .map(RuleKey::from)
        .collect();
    let badfilter_rules = rules.iter().filter(|rule| rule.is_badfilter).count();

    // Keys borrow from `rules`, so decide first and retain afterwards
    let keep: Vec<bool> = if badfilter_keys.is_empty() {
        rules.iter().map(|rule| !rule.is_badfilter).collect()
    } else {
        rules
            .iter()
            .map(|rule| !rule.is_badfilter && !badfilter_keys.contains(&RuleKey::from(rule)))
            .collect()
    };
    let badfiltered_rules = keep.iter().filter(|k| !**k).count() - badfilter_rules;
    drop(badfilter_keys);

    let mut keep = keep.into_iter();
    rules.retain(|_| keep.next().unwrap_or(true));

    let mut seen: HashSet<RuleKey<'_>> = HashSet::new();
    let keep: Vec<bool> = rules.iter().map(|rule| seen.insert(RuleKey::from(rule))).collect();
    let deduped = keep.iter().filter(|k| !**k).count();
    drop(seen);

    let mut keep = keep.into_iter();
    rules.retain(|_| keep.next().unwrap_or(true));

    let after = rules.len();
    if badfilter_rules > 0 || deduped > 0 {
        log::debug!(
            "optimized rules: {} -> {} ({} duplicates, {} badfilter, {} badfiltered)",
            before,
            after,
            deduped,
            badfilter_rules,
            badfiltered_rules
        );
    }

    OptimizeStats {
        before,
        after,
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}

/// Everything that affects matching; the raw text and line do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey<'a> {
    action: RuleAction,
    flags: RuleFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    domain: &'a str,
    pattern: Option<&'a str>,
    anchor_type: AnchorType,
    domain_constraints: Option<&'a DomainConstraint>,
}

impl<'a> From<&'a CompiledRule> for RuleKey<'a> {
    fn from(rule: &'a CompiledRule) -> Self {
        Self {
            action: rule.action,
            flags: rule.flags,
            type_mask: rule.type_mask,
            party_mask: rule.party_mask,
            domain: &rule.domain,
            pattern: rule.pattern.as_deref(),
            anchor_type: rule.anchor_type,
            domain_constraints: rule.domain_constraints.as_ref(),
        }
    }
}
