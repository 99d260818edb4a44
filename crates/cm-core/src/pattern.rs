//! URL pattern programs
//!
//! A filter pattern such as `||example.com/ads/*.js^` is compiled once into a
//! short sequence of [`PatternOp`]s and evaluated against lowercased request
//! URLs. Wildcards make the next literal "floating": it may occur anywhere at
//! or after the current position, and every occurrence is tried.

use crate::url::{get_host_position, is_separator};

/// How the start of a pattern is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    /// Pattern may start anywhere in the URL.
    #[default]
    None,
    /// `|` - pattern starts at the beginning of the URL.
    Left,
    /// `||` - pattern starts at the host or at one of its label boundaries.
    Hostname,
}

/// Pattern program opcodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternOp {
    /// Match a literal substring
    FindLit(String),
    /// `^` - one separator character, or the end of the URL
    Separator,
    /// `*` - skip any number of characters
    SkipAny,
    /// `|` at the end - assert the end of the URL
    AssertEnd,
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    anchor: AnchorType,
    ops: Vec<PatternOp>,
}

impl Pattern {
    /// Compile a pattern body (anchors already stripped).
    pub fn compile(body: &str, anchor: AnchorType, right_anchor: bool) -> Self {
        let mut ops = Vec::new();
        let mut literal = String::new();

        for ch in body.chars() {
            match ch {
                '*' | '^' => {
                    if !literal.is_empty() {
                        ops.push(PatternOp::FindLit(std::mem::take(&mut literal)));
                    }
                    if ch == '^' {
                        ops.push(PatternOp::Separator);
                    } else if ops.last() != Some(&PatternOp::SkipAny) {
                        ops.push(PatternOp::SkipAny);
                    }
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            ops.push(PatternOp::FindLit(literal));
        }

        if right_anchor {
            ops.push(PatternOp::AssertEnd);
        } else {
            // Trailing wildcards match anything
            while ops.last() == Some(&PatternOp::SkipAny) {
                ops.pop();
            }
        }

        Self { anchor, ops }
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    /// Whether the whole pattern is an unanchored hostname followed by a
    /// separator, as in `example.com^`.
    pub fn is_bare_hostname(&self) -> bool {
        if self.anchor != AnchorType::None {
            return false;
        }
        match self.ops.as_slice() {
            [PatternOp::FindLit(host), PatternOp::Separator] => is_hostname(host),
            _ => false,
        }
    }

    /// Check the pattern against a URL.
    ///
    /// Case folding is the caller's job: pass the lowercased URL for
    /// case-insensitive rules.
    pub fn is_match(&self, url: &str) -> bool {
        let bytes = url.as_bytes();
        match self.anchor {
            AnchorType::Left => self.step(bytes, 0, 0, false),
            AnchorType::None => self.step(bytes, 0, 0, true),
            AnchorType::Hostname => {
                let (host_start, host_end) = match get_host_position(url) {
                    Some(pos) => pos,
                    None => return false,
                };
                if self.step(bytes, 0, host_start, false) {
                    return true;
                }
                (host_start..host_end)
                    .filter(|&i| bytes[i] == b'.')
                    .any(|dot| self.step(bytes, 0, dot + 1, false))
            }
        }
    }

    fn step(&self, url: &[u8], op_idx: usize, pos: usize, floating: bool) -> bool {
        let op = match self.ops.get(op_idx) {
            Some(op) => op,
            None => return true,
        };

        match op {
            PatternOp::FindLit(lit) => {
                let lit = lit.as_bytes();
                if !floating {
                    return url[pos..].starts_with(lit) && self.step(url, op_idx + 1, pos + lit.len(), false);
                }
                let mut from = pos;
                while let Some(offset) = find_bytes(&url[from..], lit) {
                    let at = from + offset;
                    if self.step(url, op_idx + 1, at + lit.len(), false) {
                        return true;
                    }
                    from = at + 1;
                }
                false
            }
            PatternOp::Separator => {
                if !floating {
                    return match url.get(pos) {
                        None => self.step(url, op_idx + 1, pos, false),
                        Some(&c) if is_separator(c) => self.step(url, op_idx + 1, pos + 1, false),
                        Some(_) => false,
                    };
                }
                for p in pos..url.len() {
                    if is_separator(url[p]) && self.step(url, op_idx + 1, p + 1, false) {
                        return true;
                    }
                }
                self.step(url, op_idx + 1, url.len(), false)
            }
            PatternOp::SkipAny => self.step(url, op_idx + 1, pos, true),
            PatternOp::AssertEnd => floating || pos == url.len(),
        }
    }

    /// Pick the token used to index this pattern.
    ///
    /// Only alphanumeric runs that are guaranteed to appear as a whole URL
    /// token qualify: a run touching a wildcard or an unanchored pattern edge
    /// might be part of a longer URL token. The longest qualifying run wins.
    pub fn index_token(&self) -> Option<String> {
        let mut best: Option<&str> = None;

        for (idx, op) in self.ops.iter().enumerate() {
            let lit = match op {
                PatternOp::FindLit(lit) => lit.as_str(),
                _ => continue,
            };

            let left_bounded = match idx.checked_sub(1).map(|prev| &self.ops[prev]) {
                Some(PatternOp::Separator) => true,
                Some(_) => false,
                None => self.anchor != AnchorType::None,
            };
            let right_bounded = matches!(
                self.ops.get(idx + 1),
                Some(PatternOp::Separator) | Some(PatternOp::AssertEnd)
            );

            let runs: Vec<(usize, &str)> = lit
                .match_indices(|c: char| c.is_ascii_alphanumeric())
                .fold(Vec::new(), |mut runs: Vec<(usize, &str)>, (i, s)| {
                    match runs.last_mut() {
                        Some((start, run)) if *start + run.len() == i => {
                            *run = &lit[*start..i + s.len()];
                        }
                        _ => runs.push((i, s)),
                    }
                    runs
                });

            for (start, run) in runs {
                let touches_left = start == 0 && !left_bounded;
                let touches_right = start + run.len() == lit.len() && !right_bounded;
                if touches_left || touches_right {
                    continue;
                }
                if best.map_or(true, |b| run.len() > b.len()) {
                    best = Some(run);
                }
            }
        }

        best.filter(|token| token.len() >= MIN_INDEX_TOKEN_LEN)
            .map(|token| token.to_ascii_lowercase())
    }
}

const MIN_INDEX_TOKEN_LEN: usize = 2;

fn is_hostname(s: &str) -> bool {
    s.contains('.')
        && !s.starts_with(['.', '-'])
        && !s.ends_with(['.', '-'])
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(body: &str, anchor: AnchorType) -> Pattern {
        Pattern::compile(body, anchor, false)
    }

    #[test]
    fn plain_pattern_matches_substring() {
        let p = pattern("ads.example.com", AnchorType::None);
        assert!(p.is_match("http://ads.example.com"));
        assert!(p.is_match("https://cdn.ads.example.com/x.js"));
        assert!(!p.is_match("http://example.com/ads"));
    }

    #[test]
    fn separator_matches_end_and_punctuation() {
        let p = pattern("example.com^", AnchorType::None);
        assert!(p.is_match("http://example.com/helloworld"));
        assert!(p.is_match("http://example.com"));
        assert!(p.is_match("http://example.com:8080/"));
        assert!(!p.is_match("http://example.company.net/"));
    }

    #[test]
    fn separator_retries_later_occurrences() {
        let p = pattern("example.com^", AnchorType::None);
        assert!(p.is_match("http://example.company.net/?r=example.com"));
    }

    #[test]
    fn wildcard_between_literals() {
        let p = pattern("/ads/*.js", AnchorType::None);
        assert!(p.is_match("https://site.com/ads/banner/top.js"));
        assert!(!p.is_match("https://site.com/ads/banner.css"));
    }

    #[test]
    fn hostname_anchor_matches_label_boundaries() {
        let p = pattern("example.com/ads/", AnchorType::Hostname);
        assert!(p.is_match("https://example.com/ads/1.gif"));
        assert!(p.is_match("https://cdn.example.com/ads/1.gif"));
        assert!(!p.is_match("https://badexample.com/ads/1.gif"));
        assert!(!p.is_match("https://other.com/example.com/ads/"));
    }

    #[test]
    fn left_and_right_anchors() {
        let left = pattern("http://ads.", AnchorType::Left);
        assert!(left.is_match("http://ads.example.com/"));
        assert!(!left.is_match("https://ads.example.com/"));

        let right = Pattern::compile(".swf", AnchorType::None, true);
        assert!(right.is_match("http://example.com/movie.swf"));
        assert!(!right.is_match("http://example.com/movie.swf?x=1"));
    }

    #[test]
    fn trailing_wildcards_are_dropped() {
        assert_eq!(
            pattern("/banner/**", AnchorType::None).ops,
            vec![PatternOp::FindLit("/banner/".to_string())]
        );
    }

    #[test]
    fn index_token_skips_unbounded_edges() {
        // "ads" and "com" may be parts of longer URL tokens
        assert_eq!(pattern("ads.example.com", AnchorType::None).index_token(), Some("example".into()));
        assert_eq!(pattern("example.com^", AnchorType::None).index_token(), Some("com".into()));
        assert_eq!(pattern("tracker.net/pixel", AnchorType::Hostname).index_token(), Some("tracker".into()));
        assert_eq!(pattern("ads", AnchorType::None).index_token(), None);
        assert_eq!(pattern("banner*", AnchorType::None).index_token(), None);
    }

    #[test]
    fn bare_hostname_patterns() {
        assert!(pattern("example.com^", AnchorType::None).is_bare_hostname());
        assert!(pattern("cdn-1.example.co.uk^", AnchorType::None).is_bare_hostname());

        assert!(!pattern("example.com", AnchorType::None).is_bare_hostname());
        assert!(!pattern("example.com^", AnchorType::Hostname).is_bare_hostname());
        assert!(!pattern("https://cdn.com/ads/allowed.js", AnchorType::Left).is_bare_hostname());
        assert!(!pattern("/ads/allowed.js", AnchorType::None).is_bare_hostname());
        assert!(!pattern("example.com^ads", AnchorType::None).is_bare_hostname());
        assert!(!pattern("localhost^", AnchorType::None).is_bare_hostname());
        assert!(!pattern(".example.com^", AnchorType::None).is_bare_hostname());
    }
}
