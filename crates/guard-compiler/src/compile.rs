//! Rule compilation
//!
//! One pass converts a list snapshot into the complete replacement rule set:
//! normalize and deduplicate every list, drop expired temporary grants, then
//! build each family in precedence order with namespaced ids. The pass is
//! pure and deterministic; compiling the same snapshot twice yields the same
//! set.

use std::collections::HashSet;

use thiserror::Error;

use guard_core::normalize::{
    is_keyword_allowed, is_likely_domain, normalize_domain, normalize_keyword,
};
use guard_core::types::{CompiledRule, RuleFamily, RuleSet, UrlMatcher, MAX_RULES_PER_FAMILY};

use crate::lists::{ListSnapshot, TemporaryAllowEntry};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("family {family:?} has {count} entries, exceeding its id space")]
    TooManyRules { family: RuleFamily, count: usize },
}

/// Compile the snapshot into the full replacement rule set.
///
/// When protection is disabled the result is empty regardless of list
/// contents; the caller removes everything installed and adds nothing, and
/// repeated passes converge on that same empty set.
pub fn compile(lists: &ListSnapshot, now_ms: i64) -> Result<RuleSet, CompileError> {
    if !lists.enabled {
        return Ok(RuleSet::empty());
    }

    let blocked_domains = dedup_normalized(&lists.blocked_domains, normalize_domain, is_likely_domain);
    let blocked_subdomains =
        dedup_normalized(&lists.blocked_subdomains, normalize_domain, is_likely_domain);
    let blocked_keywords =
        dedup_normalized(&lists.blocked_keywords, normalize_keyword, is_keyword_allowed);
    let allow_domains = dedup_normalized(&lists.allow_domains, normalize_domain, is_likely_domain);
    let allow_subdomains =
        dedup_normalized(&lists.allow_subdomains, normalize_domain, is_likely_domain);

    let temp_domains = active_temp_domains(&lists.temp_allow_domains, now_ms);
    let temp_urls = active_temp_urls(&lists.temp_allow_urls, now_ms);

    let mut rules = Vec::new();

    // Highest tier first: time-boxed overrides, then standing allows, then
    // blocks.
    build_family(&mut rules, RuleFamily::TempAllowDomain, &temp_domains, |d| {
        UrlMatcher::ExactDomain(d.to_string())
    })?;
    build_family(&mut rules, RuleFamily::TempAllowUrl, &temp_urls, |u| {
        UrlMatcher::ExactUrl(u.to_string())
    })?;
    build_family(&mut rules, RuleFamily::AllowDomain, &allow_domains, |d| {
        UrlMatcher::ExactDomain(d.to_string())
    })?;
    build_family(&mut rules, RuleFamily::AllowSubdomain, &allow_subdomains, |d| {
        UrlMatcher::SubdomainWildcard(d.to_string())
    })?;
    build_family(&mut rules, RuleFamily::BlockDomain, &blocked_domains, |d| {
        UrlMatcher::ExactDomain(d.to_string())
    })?;
    build_family(&mut rules, RuleFamily::BlockSubdomain, &blocked_subdomains, |d| {
        UrlMatcher::SubdomainWildcard(d.to_string())
    })?;
    build_family(&mut rules, RuleFamily::BlockKeyword, &blocked_keywords, |k| {
        UrlMatcher::UrlSubstring(k.to_string())
    })?;

    log::debug!(
        "compiled {} rules ({} temporary allow, {} standing allow, {} block)",
        rules.len(),
        temp_domains.len() + temp_urls.len(),
        allow_domains.len() + allow_subdomains.len(),
        blocked_domains.len() + blocked_subdomains.len() + blocked_keywords.len(),
    );

    Ok(RuleSet { rules })
}

fn build_family<F>(
    rules: &mut Vec<CompiledRule>,
    family: RuleFamily,
    values: &[String],
    to_matcher: F,
) -> Result<(), CompileError>
where
    F: Fn(&str) -> UrlMatcher,
{
    if values.len() > MAX_RULES_PER_FAMILY {
        return Err(CompileError::TooManyRules {
            family,
            count: values.len(),
        });
    }
    for (index, value) in values.iter().enumerate() {
        rules.push(CompiledRule {
            id: family.rule_id(index as u32),
            priority: family.priority(),
            action: family.action(),
            matcher: to_matcher(value),
        });
    }
    Ok(())
}

/// Normalize, admit, and deduplicate on the normalized value. First
/// occurrence wins, so output order follows the list.
fn dedup_normalized<N, A>(raw: &[String], normalize: N, admit: A) -> Vec<String>
where
    N: Fn(&str) -> String,
    A: Fn(&str) -> bool,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in raw {
        let value = normalize(entry);
        if !admit(&value) {
            continue;
        }
        if seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

fn active_temp_domains(entries: &[TemporaryAllowEntry], now_ms: i64) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in entries {
        if !entry.is_active(now_ms) {
            continue;
        }
        let domain = normalize_domain(&entry.subject);
        if !is_likely_domain(&domain) {
            continue;
        }
        if seen.insert(domain.clone()) {
            out.push(domain);
        }
    }
    out
}

fn active_temp_urls(entries: &[TemporaryAllowEntry], now_ms: i64) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in entries {
        if !entry.is_active(now_ms) {
            continue;
        }
        let url = entry.subject.trim().to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            continue;
        }
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}
