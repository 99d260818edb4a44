//! Registrable-domain (eTLD+1) helpers
//!
//! A small heuristic stands in for the full Public Suffix List: the last two
//! labels, or the last three when the host ends in a well-known two-part
//! public suffix.
//!
//! # Examples
//!
//! ```
//! use cm_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part public suffixes.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a lowercase hostname.
///
/// Returns a slice of `host`; hosts with fewer labels than a registrable
/// domain are returned unchanged.
pub fn get_etld1(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    let dots: Vec<usize> = host.match_indices('.').map(|(i, _)| i).collect();
    if dots.len() < 2 {
        return host;
    }

    let last_two = &host[dots[dots.len() - 2] + 1..];
    if COMMON_TWO_PART_TLDS.contains(&last_two) {
        if dots.len() < 3 {
            return host;
        }
        return &host[dots[dots.len() - 3] + 1..];
    }

    last_two
}

/// Check if a request is third-party relative to the page host.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    get_etld1(site_host) != get_etld1(req_host)
}

/// Check if `host` is `domain` or one of its subdomains.
#[inline]
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    match host.strip_suffix(domain) {
        Some("") => true,
        Some(rest) => rest.ends_with('.'),
        None => false,
    }
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full to eTLD+1.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
    etld1_len: usize,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = get_parent_domain(current).filter(|parent| parent.len() >= self.etld1_len);
        Some(current)
    }
}

/// Walk host suffixes from most specific to least specific, stopping at the
/// registrable domain.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    HostSuffixIter {
        current: (!host.is_empty()).then_some(host),
        etld1_len: get_etld1(host).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etld1_simple() {
        assert_eq!(get_etld1("example.com"), "example.com");
        assert_eq!(get_etld1("sub.example.com"), "example.com");
        assert_eq!(get_etld1("a.b.example.com"), "example.com");
        assert_eq!(get_etld1("localhost"), "localhost");
    }

    #[test]
    fn test_etld1_two_part() {
        assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
        assert_eq!(get_etld1("example.co.uk"), "example.co.uk");
        assert_eq!(get_etld1("co.uk"), "co.uk");
    }

    #[test]
    fn test_is_third_party() {
        assert!(!is_third_party("example.com", "ads.example.com"));
        assert!(is_third_party("facebook.com", "ads.example.com"));
    }

    #[test]
    fn test_host_matches_domain() {
        assert!(host_matches_domain("example.com", "example.com"));
        assert!(host_matches_domain("ads.example.com", "example.com"));
        assert!(!host_matches_domain("badexample.com", "example.com"));
        assert!(!host_matches_domain("example.com", "ads.example.com"));
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn test_walk_host_suffixes() {
        let suffixes: Vec<&str> = walk_host_suffixes("a.b.example.com").collect();
        assert_eq!(suffixes, vec!["a.b.example.com", "b.example.com", "example.com"]);
        assert_eq!(walk_host_suffixes("").count(), 0);
    }
}
