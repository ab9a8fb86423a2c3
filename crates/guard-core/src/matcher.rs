//! Navigation matching
//!
//! Reference evaluation of an emitted rule set, following the contract the
//! external enforcement layer applies: every matching rule is a candidate,
//! the highest priority number wins, and an allow rule wins a priority tie.
//! Only top-level navigations are evaluated.

use crate::types::{BlockKind, CompiledRule, RuleAction, UrlMatcher};
use crate::url::extract_host;

// =============================================================================
// Verdicts
// =============================================================================

/// Outcome of evaluating one navigation against the installed rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationVerdict {
    /// No rule matched; the navigation proceeds.
    Unmatched,
    /// An allow rule won.
    Allowed { rule_id: u32 },
    /// A block rule won. `kind` and `matched` feed the block notice.
    Blocked {
        rule_id: u32,
        kind: BlockKind,
        matched: String,
    },
}

impl NavigationVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, NavigationVerdict::Blocked { .. })
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluate a top-level navigation URL against a rule set.
pub fn match_navigation(rules: &[CompiledRule], url: &str) -> NavigationVerdict {
    let url = url.trim();

    // Rules are anchored to http(s); anything else can never match.
    let Some(host) = extract_host(url) else {
        return NavigationVerdict::Unmatched;
    };
    let host = host.to_ascii_lowercase();
    let url_lower = url.to_ascii_lowercase();

    let mut best_allow: Option<&CompiledRule> = None;
    let mut best_block: Option<&CompiledRule> = None;

    for rule in rules {
        if !matcher_applies(&rule.matcher, url, &url_lower, &host) {
            continue;
        }
        let best = match rule.action {
            RuleAction::Allow => &mut best_allow,
            RuleAction::Block => &mut best_block,
        };
        if best.map_or(true, |b| rule.priority > b.priority) {
            *best = Some(rule);
        }
    }

    match (best_allow, best_block) {
        (None, None) => NavigationVerdict::Unmatched,
        (Some(allow), None) => NavigationVerdict::Allowed { rule_id: allow.id },
        (None, Some(block)) => blocked_verdict(block),
        (Some(allow), Some(block)) => {
            if allow.priority >= block.priority {
                NavigationVerdict::Allowed { rule_id: allow.id }
            } else {
                blocked_verdict(block)
            }
        }
    }
}

fn blocked_verdict(rule: &CompiledRule) -> NavigationVerdict {
    let (kind, matched) = match &rule.matcher {
        UrlMatcher::ExactDomain(domain) => (BlockKind::Domain, domain.clone()),
        UrlMatcher::SubdomainWildcard(domain) => (BlockKind::Subdomain, domain.clone()),
        UrlMatcher::UrlSubstring(keyword) => (BlockKind::Keyword, keyword.clone()),
        // Block rules are never compiled with an exact-url matcher.
        UrlMatcher::ExactUrl(exact) => (BlockKind::Domain, exact.clone()),
    };
    log::debug!("navigation blocked by rule {} ({})", rule.id, kind.as_str());
    NavigationVerdict::Blocked {
        rule_id: rule.id,
        kind,
        matched,
    }
}

fn matcher_applies(matcher: &UrlMatcher, url: &str, url_lower: &str, host: &str) -> bool {
    match matcher {
        UrlMatcher::ExactDomain(domain) => host == domain,
        UrlMatcher::SubdomainWildcard(domain) => is_strict_subdomain(host, domain),
        UrlMatcher::UrlSubstring(keyword) => url_lower.contains(keyword.as_str()),
        UrlMatcher::ExactUrl(exact) => url == exact,
    }
}

/// `sub.example.com` is a strict subdomain of `example.com`; the bare domain
/// itself is not.
fn is_strict_subdomain(host: &str, domain: &str) -> bool {
    host.len() > domain.len() + 1
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}
