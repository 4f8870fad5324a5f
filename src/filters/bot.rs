//! Bot and automation detection.
//!
//! Senders are matched case-insensitively against regular expressions;
//! message bodies are matched against lowercase substrings.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Default patterns for bot sender names
pub const DEFAULT_BOT_PATTERNS: &[&str] = &[
    r"\bbot\b",
    r"slackbot",
    r"workflow",
    r"automation",
    r"\bapp\b",
    r"integration",
    r"webhook",
];

/// Default message fragments that indicate automated channel activity
pub const DEFAULT_BOT_KEYWORDS: &[&str] = &[
    "has joined the channel",
    "has left the channel",
    "set the channel topic",
    "set the channel description",
    "set the channel purpose",
    "was added to",
    "was removed from",
    "archived the channel",
    "unarchived the channel",
    "renamed the channel",
];

/// Classifies messages as automated noise
#[derive(Debug, Clone)]
pub struct BotFilter {
    sender_patterns: Vec<Regex>,
    keywords: Vec<String>,
}

impl Default for BotFilter {
    fn default() -> Self {
        Self::from_parts(DEFAULT_BOT_PATTERNS.iter().copied(), DEFAULT_BOT_KEYWORDS.iter().copied())
            .expect("default bot patterns are valid")
    }
}

impl BotFilter {
    /// Build a filter from custom patterns and keywords.
    ///
    /// An empty pattern or keyword list falls back to the defaults.
    pub fn new(patterns: &[String], keywords: &[String]) -> Result<Self, regex::Error> {
        let patterns: Vec<&str> = if patterns.is_empty() {
            DEFAULT_BOT_PATTERNS.to_vec()
        } else {
            patterns.iter().map(String::as_str).collect()
        };
        let keywords: Vec<&str> = if keywords.is_empty() {
            DEFAULT_BOT_KEYWORDS.to_vec()
        } else {
            keywords.iter().map(String::as_str).collect()
        };

        Self::from_parts(patterns, keywords)
    }

    fn from_parts<'a>(
        patterns: impl IntoIterator<Item = &'a str>,
        keywords: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, regex::Error> {
        let sender_patterns = patterns
            .into_iter()
            .map(compile_pattern)
            .collect::<Result<Vec<_>, _>>()?;
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();

        Ok(Self {
            sender_patterns,
            keywords,
        })
    }

    /// Returns true if the message looks automated
    pub fn is_bot(&self, sender: &str, message: &str) -> bool {
        if let Some(pattern) = self.sender_patterns.iter().find(|p| p.is_match(sender)) {
            debug!(sender, pattern = pattern.as_str(), "Bot detected by name pattern");
            return true;
        }

        let message_lower = message.to_lowercase();
        if let Some(keyword) = self.keywords.iter().find(|k| message_lower.contains(k.as_str())) {
            debug!(keyword = %keyword, "Bot detected by keyword");
            return true;
        }

        false
    }

    /// Add a sender pattern (operator tuning)
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.sender_patterns.push(compile_pattern(pattern)?);
        Ok(())
    }

    /// Add a message keyword (operator tuning)
    pub fn add_keyword(&mut self, keyword: &str) {
        self.keywords.push(keyword.to_lowercase());
    }

    pub fn pattern_count(&self) -> usize {
        self.sender_patterns.len()
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
