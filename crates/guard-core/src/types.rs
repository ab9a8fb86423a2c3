//! Core type definitions for Guardian
//!
//! These types describe the rule set the compiler emits and the enforcement
//! layer consumes. Ids and priorities are plain integers because the
//! external matcher evaluates precedence statically; all semantics live in
//! the numbers assigned here.

use serde::{Deserialize, Serialize};

// =============================================================================
// Rule Actions
// =============================================================================

/// Action taken when a rule matches a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Exception rule - the navigation proceeds
    Allow,
    /// Block rule - the navigation is redirected to the block notice
    Block,
}

// =============================================================================
// Priority Tiers
// =============================================================================

// The matcher picks the highest priority number among matching rules, so the
// tiers must be strictly ordered: time-boxed user overrides outrank standing
// allow-lists, which outrank every block rule.

/// Priority of all block rules.
pub const PRIORITY_BLOCK: u32 = 1;
/// Priority of standing allow rules.
pub const PRIORITY_ALLOW: u32 = 10;
/// Priority of temporary (expiring) allow rules.
pub const PRIORITY_TEMP_ALLOW: u32 = 20;

// =============================================================================
// Rule Families
// =============================================================================

/// Hard cap on rules within a single family. Ids from different families
/// would collide past this bound, so the compiler enforces it instead of
/// assuming it.
pub const MAX_RULES_PER_FAMILY: usize = 100_000;

/// Rule families, each owning a fixed slice of the id space.
///
/// A rule id is `prefix * 100_000 + index + 1`, so ids are unique across the
/// whole emitted set and stable enough within one compilation pass to be
/// removed by id in the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RuleFamily {
    BlockDomain = 1,
    BlockSubdomain = 2,
    BlockKeyword = 3,
    TempAllowDomain = 6,
    TempAllowUrl = 7,
    AllowSubdomain = 8,
    AllowDomain = 9,
}

impl RuleFamily {
    /// The id-namespace prefix of this family.
    #[inline]
    pub const fn prefix(self) -> u32 {
        self as u32
    }

    /// Id of the `index`-th rule of this family.
    #[inline]
    pub const fn rule_id(self, index: u32) -> u32 {
        self.prefix() * 100_000 + index + 1
    }

    /// Priority tier of rules in this family.
    pub const fn priority(self) -> u32 {
        match self {
            RuleFamily::TempAllowDomain | RuleFamily::TempAllowUrl => PRIORITY_TEMP_ALLOW,
            RuleFamily::AllowDomain | RuleFamily::AllowSubdomain => PRIORITY_ALLOW,
            RuleFamily::BlockDomain | RuleFamily::BlockSubdomain | RuleFamily::BlockKeyword => {
                PRIORITY_BLOCK
            }
        }
    }

    /// Action carried by rules of this family.
    pub const fn action(self) -> RuleAction {
        match self {
            RuleFamily::BlockDomain | RuleFamily::BlockSubdomain | RuleFamily::BlockKeyword => {
                RuleAction::Block
            }
            _ => RuleAction::Allow,
        }
    }
}

// =============================================================================
// Matchers
// =============================================================================

/// URL condition a compiled rule tests against a top-level navigation.
/// Sub-resource loads are never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UrlMatcher {
    /// Hostname equals the domain exactly.
    ExactDomain(String),
    /// Hostname is a strict subdomain of the domain; the bare domain itself
    /// never matches.
    SubdomainWildcard(String),
    /// Raw substring anywhere in the scheme-anchored URL. Deliberately
    /// over-broad; a keyword can match inside an unrelated path segment.
    UrlSubstring(String),
    /// The whole URL, byte for byte.
    ExactUrl(String),
}

// =============================================================================
// Compiled Rules
// =============================================================================

/// One rule of the emitted replacement set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub matcher: UrlMatcher,
}

/// A complete rule set produced by one compilation pass. Always installed as
/// a whole; never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// The rule set that removes everything and adds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ids of every rule in the set.
    pub fn ids(&self) -> Vec<u32> {
        self.rules.iter().map(|r| r.id).collect()
    }
}

// =============================================================================
// Block Kinds
// =============================================================================

/// What a blocked navigation matched on. Serialized as the `type` query
/// parameter of the block notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Domain,
    Subdomain,
    Keyword,
}

impl BlockKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            BlockKind::Domain => "domain",
            BlockKind::Subdomain => "subdomain",
            BlockKind::Keyword => "keyword",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "domain" => Some(BlockKind::Domain),
            "subdomain" => Some(BlockKind::Subdomain),
            "keyword" => Some(BlockKind::Keyword),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_ids_are_namespaced_per_family() {
        assert_eq!(RuleFamily::BlockDomain.rule_id(0), 100_001);
        assert_eq!(RuleFamily::BlockSubdomain.rule_id(0), 200_001);
        assert_eq!(RuleFamily::BlockKeyword.rule_id(41), 300_042);
        assert_eq!(RuleFamily::AllowDomain.rule_id(0), 900_001);
    }

    #[test]
    fn family_id_ranges_never_overlap() {
        let families = [
            RuleFamily::BlockDomain,
            RuleFamily::BlockSubdomain,
            RuleFamily::BlockKeyword,
            RuleFamily::TempAllowDomain,
            RuleFamily::TempAllowUrl,
            RuleFamily::AllowSubdomain,
            RuleFamily::AllowDomain,
        ];
        let max_index = (MAX_RULES_PER_FAMILY - 1) as u32;
        for (i, a) in families.iter().enumerate() {
            for b in &families[i + 1..] {
                assert!(
                    a.rule_id(max_index) < b.rule_id(0) || b.rule_id(max_index) < a.rule_id(0),
                    "{a:?} and {b:?} id ranges overlap"
                );
            }
        }
    }

    #[test]
    fn priority_tiers_are_strictly_ordered() {
        assert!(PRIORITY_TEMP_ALLOW > PRIORITY_ALLOW);
        assert!(PRIORITY_ALLOW > PRIORITY_BLOCK);
        assert_eq!(RuleFamily::TempAllowUrl.priority(), PRIORITY_TEMP_ALLOW);
        assert_eq!(RuleFamily::AllowDomain.priority(), PRIORITY_ALLOW);
        assert_eq!(RuleFamily::BlockKeyword.priority(), PRIORITY_BLOCK);
    }

    #[test]
    fn block_families_block_and_allow_families_allow() {
        assert_eq!(RuleFamily::BlockDomain.action(), RuleAction::Block);
        assert_eq!(RuleFamily::BlockSubdomain.action(), RuleAction::Block);
        assert_eq!(RuleFamily::BlockKeyword.action(), RuleAction::Block);
        assert_eq!(RuleFamily::AllowDomain.action(), RuleAction::Allow);
        assert_eq!(RuleFamily::TempAllowUrl.action(), RuleAction::Allow);
    }

    #[test]
    fn block_kind_round_trips_through_param() {
        for kind in [BlockKind::Domain, BlockKind::Subdomain, BlockKind::Keyword] {
            assert_eq!(BlockKind::from_param(kind.as_str()), Some(kind));
        }
        assert_eq!(BlockKind::from_param("other"), None);
    }
}
