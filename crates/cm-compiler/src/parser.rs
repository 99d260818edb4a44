use std::net::IpAddr;

use regex::RegexBuilder;

use cm_core::pattern::AnchorType;
use cm_core::types::{DomainConstraint, PartyMask, RequestType, RuleAction, RuleFlags};

use crate::error::{CompileError, CompileErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub action: RuleAction,
    pub flags: RuleFlags,
    /// Host for `||host^` rules, empty for pattern rules
    pub domain: String,
    /// Pattern body with anchors stripped; `None` for host rules
    pub pattern: Option<String>,
    pub anchor_type: AnchorType,
    pub type_mask: RequestType,
    pub party_mask: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
    pub is_badfilter: bool,
    /// Original rule text
    pub raw: String,
    /// 1-based line number within the list
    pub line: usize,
}

/// Parse a whole filter list.
pub fn parse_filter_list(text: &str) -> Result<Vec<CompiledRule>, CompileError> {
    parse_filter_lines(text.lines())
}

/// Parse filter list lines.
///
/// Comments, cosmetic rules and rules relying on options this engine does not
/// evaluate are skipped. Malformed rules abort parsing.
pub fn parse_filter_lines<I, S>(lines: I) -> Result<Vec<CompiledRule>, CompileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rules = Vec::new();
    let mut skipped = 0usize;

    for (idx, raw_line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.as_ref().trim();
        if line.is_empty() || is_comment_line(line) || is_cosmetic_line(line) {
            continue;
        }

        match parse_line(line) {
            Ok(Some(mut rule)) => {
                rule.line = line_no;
                rules.push(rule);
            }
            Ok(None) => {
                skipped += 1;
                log::debug!("skipping unsupported rule at line {}: {}", line_no, line);
            }
            Err(kind) => {
                return Err(CompileError {
                    line: line_no,
                    rule: line.to_string(),
                    kind,
                })
            }
        }
    }

    log::debug!("parsed {} network rules ({} unsupported skipped)", rules.len(), skipped);
    Ok(rules)
}

fn parse_line(line: &str) -> Result<Option<CompiledRule>, CompileErrorKind> {
    let raw = line.to_string();
    let mut line = line;

    let mut action = RuleAction::Block;
    if let Some(rest) = line.strip_prefix("@@") {
        action = RuleAction::Allow;
        line = rest.trim_start();
    }

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => match parse_options(options_text)? {
            Some(options) => options,
            None => return Ok(None),
        },
        None => ParsedOptions::default(),
    };

    let pattern_str = pattern_part.trim();
    let base = CompiledRule {
        action,
        flags: options.flags,
        domain: String::new(),
        pattern: None,
        anchor_type: AnchorType::None,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        domain_constraints: options.domain_constraints,
        is_badfilter: options.is_badfilter,
        raw,
        line: 0,
    };

    if let Some(body) = parse_regex_rule(pattern_str) {
        RegexBuilder::new(body)
            .case_insensitive(!base.flags.contains(RuleFlags::MATCH_CASE))
            .build()
            .map_err(|e| CompileErrorKind::InvalidRegex(e.to_string()))?;
        return Ok(Some(CompiledRule {
            flags: base.flags | RuleFlags::IS_REGEX,
            pattern: Some(body.to_string()),
            ..base
        }));
    }

    if let Some(domain) = parse_host_anchor_rule(pattern_str) {
        return Ok(Some(CompiledRule {
            flags: base.flags | RuleFlags::HAS_HOST_ANCHOR,
            domain,
            anchor_type: AnchorType::Hostname,
            ..base
        }));
    }

    if let Some(domain) = parse_hosts_file_domain(pattern_str) {
        return Ok(Some(CompiledRule {
            flags: base.flags | RuleFlags::HAS_HOST_ANCHOR,
            domain,
            anchor_type: AnchorType::Hostname,
            ..base
        }));
    }

    let parsed = parse_pattern_rule(pattern_str, options_text.is_some())?;
    let mut flags = base.flags;
    if parsed.right_anchor {
        flags |= RuleFlags::HAS_RIGHT_ANCHOR;
    }
    match parsed.anchor_type {
        AnchorType::Hostname => flags |= RuleFlags::HAS_HOST_ANCHOR,
        AnchorType::Left => flags |= RuleFlags::HAS_LEFT_ANCHOR,
        AnchorType::None => {}
    }

    Ok(Some(CompiledRule {
        flags,
        domain: parsed.domain,
        pattern: Some(parsed.pattern),
        anchor_type: parsed.anchor_type,
        ..base
    }))
}

#[derive(Clone)]
struct ParsedOptions {
    flags: RuleFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    domain_constraints: Option<DomainConstraint>,
    is_badfilter: bool,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            type_mask: RequestType::empty(),
            party_mask: PartyMask::empty(),
            domain_constraints: None,
            is_badfilter: false,
        }
    }
}

/// Options after the last `$`, unless the rule is a bare regex that merely
/// contains a `$` anchor.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    if line.len() > 2 && line.starts_with('/') && line.ends_with('/') {
        return (line, None);
    }
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

/// Options that only affect things other than request blocking.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "popup", "popunder", "csp", "redirect", "redirect-rule", "removeparam", "queryprune",
    "elemhide", "ehide", "generichide", "ghide", "specifichide", "shide", "genericblock",
    "sitekey", "rewrite", "empty", "mp4", "webrtc", "header", "permissions", "replace",
    "inline-script", "inline-font", "cname", "all", "denyallow", "to", "method", "urltransform",
];

/// Returns `Ok(None)` when the rule uses an option the engine cannot evaluate.
fn parse_options(text: &str) -> Result<Option<ParsedOptions>, CompileErrorKind> {
    let mut flags = RuleFlags::empty();
    let mut type_include = 0u32;
    let mut type_exclude = 0u32;
    let mut party_include = 0u8;
    let mut party_exclude = 0u8;
    let mut domain_constraints: Option<DomainConstraint> = None;
    let mut is_badfilter = false;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        match raw_lower {
            "important" => {
                flags |= RuleFlags::IMPORTANT;
                continue;
            }
            "match-case" | "match_case" => {
                flags |= RuleFlags::MATCH_CASE;
                continue;
            }
            "badfilter" => {
                is_badfilter = true;
                continue;
            }
            "collapse" | "~collapse" | "donottrack" => continue,
            _ => {}
        }

        if let Some(domain_value) = raw_lower
            .strip_prefix("domain=")
            .or_else(|| raw_lower.strip_prefix("from="))
        {
            let parsed = parse_domain_option(domain_value)?;
            domain_constraints = Some(merge_constraints(domain_constraints, parsed));
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        let option_name = name.split('=').next().unwrap_or(name);
        if !UNSUPPORTED_OPTIONS.contains(&option_name) {
            log::debug!("unknown filter option `{}`", raw);
        }
        return Ok(None);
    }

    let type_bits = finalize_mask_u32(type_include, type_exclude, RequestType::ALL.bits())
        .ok_or(CompileErrorKind::EmptyTypeMask)?;
    let party_bits = finalize_mask_u8(party_include, party_exclude, PartyMask::ALL.bits())
        .ok_or(CompileErrorKind::EmptyPartyMask)?;

    Ok(Some(ParsedOptions {
        flags,
        type_mask: RequestType::from_bits_truncate(type_bits),
        party_mask: PartyMask::from_bits_truncate(party_bits),
        domain_constraints,
        is_badfilter,
    }))
}

fn merge_constraints(existing: Option<DomainConstraint>, incoming: DomainConstraint) -> DomainConstraint {
    match existing {
        Some(mut current) => {
            current.include.extend(incoming.include);
            current.exclude.extend(incoming.exclude);
            current
        }
        None => incoming,
    }
}

fn parse_domain_option(value: &str) -> Result<DomainConstraint, CompileErrorKind> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)
            .ok_or_else(|| CompileErrorKind::InvalidDomain(domain_raw.to_string()))?;

        if is_exclude {
            exclude.push(domain);
        } else {
            include.push(domain);
        }
    }

    if include.is_empty() && exclude.is_empty() {
        return Err(CompileErrorKind::InvalidDomain(value.to_string()));
    }

    Ok(DomainConstraint { include, exclude })
}

/// Combine include/exclude bits; `None` if nothing is left, `0` for "any".
fn finalize_mask_u32(include: u32, exclude: u32, all: u32) -> Option<u32> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn finalize_mask_u8(include: u8, exclude: u8, all: u8) -> Option<u8> {
    finalize_mask_u32(include as u32, exclude as u32, all as u32).map(|mask| mask as u8)
}

fn request_type_mask(name: &str) -> Option<u32> {
    match name {
        "script" => Some(RequestType::SCRIPT.bits()),
        "image" => Some(RequestType::IMAGE.bits()),
        "stylesheet" | "css" => Some(RequestType::STYLESHEET.bits()),
        "object" | "object-subrequest" => Some(RequestType::OBJECT.bits()),
        "subdocument" | "frame" => Some(RequestType::SUBDOCUMENT.bits()),
        "document" | "doc" | "main_frame" => Some(RequestType::MAIN_FRAME.bits()),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST.bits()),
        "media" => Some(RequestType::MEDIA.bits()),
        "font" => Some(RequestType::FONT.bits()),
        "ping" => Some(RequestType::PING.bits()),
        "websocket" => Some(RequestType::WEBSOCKET.bits()),
        "beacon" => Some(RequestType::BEACON.bits()),
        "fetch" => Some(RequestType::FETCH.bits()),
        "csp_report" => Some(RequestType::CSP_REPORT.bits()),
        "other" => Some(RequestType::OTHER.bits()),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<u8> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY.bits()),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY.bits()),
        _ => None,
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
}

fn is_cosmetic_line(line: &str) -> bool {
    ["##", "#@#", "#?#", "#@?#", "#$#", "#@$#", "#%#"]
        .iter()
        .any(|marker| line.contains(marker))
}

/// `/regex/` body, if the pattern is a regex.
fn parse_regex_rule(pattern: &str) -> Option<&str> {
    if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}

/// `||host^` with nothing after the separator.
fn parse_host_anchor_rule(line: &str) -> Option<String> {
    let rest = line.strip_prefix("||")?;
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    let host = rest.strip_suffix("^|").or_else(|| rest.strip_suffix('^'))?;
    normalize_domain(host)
}

fn parse_hosts_file_domain(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_ok() {
        return normalize_domain(second);
    }

    None
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

struct ParsedPattern {
    domain: String,
    pattern: String,
    anchor_type: AnchorType,
    right_anchor: bool,
}

fn parse_pattern_rule(line: &str, has_options: bool) -> Result<ParsedPattern, CompileErrorKind> {
    let (anchor_type, rest) = if let Some(rest) = line.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = line.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, line)
    };

    let (rest, right_anchor) = match rest.strip_suffix('|') {
        Some(stripped) => (stripped, true),
        None => (rest, false),
    };

    // An empty pattern is only meaningful when options narrow it down
    if rest.is_empty() && (anchor_type != AnchorType::None || right_anchor || !has_options) {
        return Err(CompileErrorKind::EmptyPattern);
    }

    Ok(ParsedPattern {
        domain: extract_pattern_domain(rest, anchor_type),
        pattern: rest.to_string(),
        anchor_type,
        right_anchor,
    })
}

fn extract_pattern_domain(pattern: &str, anchor_type: AnchorType) -> String {
    if anchor_type != AnchorType::Hostname {
        return String::new();
    }

    let end = pattern
        .find(|ch| matches!(ch, '/' | '^' | '*' | '?' | '#' | ':'))
        .unwrap_or(pattern.len());
    normalize_domain(&pattern[..end]).unwrap_or_default()
}
