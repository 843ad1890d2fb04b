use crate::config::RuleConfig;
use crate::message::Category;
use anyhow::{Context, Result};
use regex::Regex;

/// Local keyword/pattern matcher. A hit here is a cheap, high-confidence
/// circuit breaker: the message is blocked immediately, with no remote call
/// and no reputation transaction.
pub struct RuleMatcher {
    sexual: Vec<String>,
    hate_or_threat: Vec<String>,
    grooming: Vec<String>,
    link: Regex,
    phone: Regex,
}

impl RuleMatcher {
    /// Patterns are compiled once at construction, like every other hot-path
    /// regex in the system.
    pub fn new(config: &RuleConfig) -> Result<Self> {
        Ok(Self {
            sexual: lowered(&config.sexual),
            hate_or_threat: lowered(&config.hate_or_threat),
            grooming: lowered(&config.grooming),
            link: Regex::new(&config.link_pattern)
                .with_context(|| format!("invalid link pattern: {}", config.link_pattern))?,
            phone: Regex::new(&config.phone_pattern)
                .with_context(|| format!("invalid phone pattern: {}", config.phone_pattern))?,
        })
    }

    /// Checks the normalized text against each category in fixed priority
    /// order: sexual > hate_or_threat > grooming > link/phone scam patterns.
    /// The first match wins; a message containing both a sexual term and a
    /// threat must classify as sexual.
    pub fn check(&self, normalized: &str) -> Option<Category> {
        if normalized.is_empty() {
            return None;
        }
        if contains_any(normalized, &self.sexual) {
            return Some(Category::Sexual);
        }
        if contains_any(normalized, &self.hate_or_threat) {
            return Some(Category::HateOrThreat);
        }
        if contains_any(normalized, &self.grooming) {
            return Some(Category::Grooming);
        }
        if self.link.is_match(normalized) || self.phone.is_match(normalized) {
            return Some(Category::Scam);
        }
        None
    }
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| text.contains(needle.as_str()))
}

// Keyword lists are matched against normalized (lowercased) text, so the
// lists themselves are lowercased up front.
fn lowered(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}
