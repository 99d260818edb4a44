use regex::RegexBuilder;

use cm_core::matcher::Engine;
use cm_core::pattern::Pattern;
use cm_core::rule::{NetworkRule, RuleMatcher};
use cm_core::types::RuleFlags;

use crate::error::{CompileError, CompileErrorKind};
use crate::parser::CompiledRule;

/// Turn a parsed rule into its evaluated form.
pub fn build_rule(rule: &CompiledRule) -> Result<NetworkRule, CompileError> {
    let match_case = rule.flags.contains(RuleFlags::MATCH_CASE);

    let matcher = match &rule.pattern {
        None => RuleMatcher::Host(rule.domain.clone()),
        Some(body) if rule.flags.contains(RuleFlags::IS_REGEX) => {
            let regex = RegexBuilder::new(body)
                .case_insensitive(!match_case)
                .build()
                .map_err(|e| CompileError {
                    line: rule.line,
                    rule: rule.raw.clone(),
                    kind: CompileErrorKind::InvalidRegex(e.to_string()),
                })?;
            RuleMatcher::Regex(regex)
        }
        Some(body) => {
            let right_anchor = rule.flags.contains(RuleFlags::HAS_RIGHT_ANCHOR);
            if match_case {
                RuleMatcher::Pattern(Pattern::compile(body, rule.anchor_type, right_anchor))
            } else {
                let lowered = body.to_ascii_lowercase();
                RuleMatcher::Pattern(Pattern::compile(&lowered, rule.anchor_type, right_anchor))
            }
        }
    };

    Ok(NetworkRule {
        action: rule.action,
        flags: rule.flags,
        type_mask: rule.type_mask,
        party_mask: rule.party_mask,
        domain_constraints: rule.domain_constraints.clone(),
        matcher,
        raw: rule.raw.clone(),
    })
}

/// Build a matching engine from parsed rules, keeping their order.
pub fn build_engine(rules: &[CompiledRule]) -> Result<Engine, CompileError> {
    let rules = rules.iter().map(build_rule).collect::<Result<Vec<_>, _>>()?;
    Ok(Engine::new(rules))
}
