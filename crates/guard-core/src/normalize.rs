//! Canonicalization of policy list entries
//!
//! Every list entry passes through here before dedup and rule building. The
//! functions are total: bad input never fails, it just comes out as a string
//! that the admission predicates reject.

/// Canonical form of a domain entry: trimmed, lowercased, scheme and path
/// stripped, leading wildcard label removed. Idempotent.
pub fn normalize_domain(input: &str) -> String {
    let mut v = input.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = v.strip_prefix(scheme) {
            v = rest.to_string();
            break;
        }
    }
    if let Some(slash) = v.find('/') {
        v.truncate(slash);
    }
    if let Some(rest) = v.strip_prefix("*.") {
        v = rest.to_string();
    }
    v
}

/// Canonical form of a keyword entry: trimmed and lowercased.
pub fn normalize_keyword(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Admission filter for domain entries: labels of `[a-z0-9.-]` ending in an
/// alphabetic TLD of at least two characters. Deliberately permissive; this
/// is a shape check, not a domain-name validator.
pub fn is_likely_domain(value: &str) -> bool {
    let Some((head, tld)) = value.rsplit_once('.') else {
        return false;
    };
    if head.is_empty() || tld.len() < 2 {
        return false;
    }
    tld.chars().all(|c| c.is_ascii_alphabetic())
        && head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Admission filter for keyword entries. Short keywords would turn the
/// substring matcher into a blanket block.
pub fn is_keyword_allowed(keyword: &str) -> bool {
    keyword.chars().count() >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_strips_scheme_path_and_wildcard() {
        assert_eq!(normalize_domain("https://Example.com/watch?v=1"), "example.com");
        assert_eq!(normalize_domain("http://shop.test/"), "shop.test");
        assert_eq!(normalize_domain("*.example.com"), "example.com");
        assert_eq!(normalize_domain("  EXAMPLE.COM  "), "example.com");
        assert_eq!(normalize_domain("example.com"), "example.com");
    }

    #[test]
    fn normalize_domain_is_idempotent() {
        for input in [
            "https://Example.com/path",
            "*.sub.example.com",
            "weird input",
            "",
            "http://*.a.b/c",
        ] {
            let once = normalize_domain(input);
            assert_eq!(normalize_domain(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn normalize_keyword_trims_and_lowercases() {
        assert_eq!(normalize_keyword("  Gambling "), "gambling");
        assert_eq!(normalize_keyword(""), "");
    }

    #[test]
    fn likely_domain_accepts_host_shapes() {
        assert!(is_likely_domain("example.com"));
        assert!(is_likely_domain("sub.example.co"));
        assert!(is_likely_domain("a-b.example.info"));
        assert!(is_likely_domain("123.example.org"));
    }

    #[test]
    fn likely_domain_rejects_non_hosts() {
        assert!(!is_likely_domain("example"));
        assert!(!is_likely_domain("example.c"));
        assert!(!is_likely_domain("example.123"));
        assert!(!is_likely_domain(".com"));
        assert!(!is_likely_domain("has space.com"));
        assert!(!is_likely_domain(""));
    }

    #[test]
    fn keyword_admission_requires_three_chars() {
        assert!(is_keyword_allowed("abc"));
        assert!(is_keyword_allowed("gambling"));
        assert!(!is_keyword_allowed("ab"));
        assert!(!is_keyword_allowed(""));
    }
}
