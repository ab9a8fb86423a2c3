//! URL helpers for navigation matching
//!
//! Every rule condition is anchored to the http(s) scheme, so these helpers
//! only understand those two schemes. They work on string slices and avoid
//! allocating.

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Scheme of a navigation URL, when it is one the rule set can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavScheme {
    Http,
    Https,
}

impl NavScheme {
    /// Length of the scheme prefix including `://`.
    #[inline]
    pub const fn prefix_len(self) -> usize {
        match self {
            NavScheme::Http => 7,
            NavScheme::Https => 8,
        }
    }
}

/// Fast scheme check without URL parsing. Returns `None` for any scheme the
/// rule set cannot match.
#[inline]
pub fn extract_scheme(url: &str) -> Option<NavScheme> {
    let bytes = url.as_bytes();
    if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
        Some(NavScheme::Https)
    } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
        Some(NavScheme::Http)
    } else {
        None
    }
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Host slice of an http(s) URL, with userinfo and port stripped.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let scheme = extract_scheme(url)?;
    let rest = &url[scheme.prefix_len()..];

    // Host ends at the first of '/', '?', '#', or end of string
    let end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let mut host = &rest[..end];

    if let Some(at) = host.rfind('@') {
        host = &host[at + 1..];
    }
    if let Some(colon) = host.rfind(':') {
        let port = &host[colon + 1..];
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            host = &host[..colon];
        }
    }

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_extraction_accepts_http_and_https_only() {
        assert_eq!(extract_scheme("http://a.test"), Some(NavScheme::Http));
        assert_eq!(extract_scheme("HTTPS://a.test"), Some(NavScheme::Https));
        assert_eq!(extract_scheme("ftp://a.test"), None);
        assert_eq!(extract_scheme("chrome://settings"), None);
        assert_eq!(extract_scheme("a.test"), None);
    }

    #[test]
    fn host_extraction_handles_paths_queries_and_fragments() {
        assert_eq!(extract_host("https://shop.test/page?q=1"), Some("shop.test"));
        assert_eq!(extract_host("http://shop.test#frag"), Some("shop.test"));
        assert_eq!(extract_host("https://shop.test"), Some("shop.test"));
    }

    #[test]
    fn host_extraction_strips_userinfo_and_port() {
        assert_eq!(extract_host("https://user:pw@shop.test/"), Some("shop.test"));
        assert_eq!(extract_host("http://shop.test:8080/x"), Some("shop.test"));
    }

    #[test]
    fn host_extraction_rejects_non_http_urls() {
        assert_eq!(extract_host("file:///etc/hosts"), None);
        assert_eq!(extract_host("https://"), None);
    }
}
