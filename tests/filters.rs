//! Filter Integration Tests
//!
//! Bot classification and dedup behavior through the public API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use slackpulse::filters::fingerprint;
use slackpulse::{BotFilter, Config, DeduplicationCache};

#[test]
fn test_dedup_is_case_and_whitespace_insensitive() {
    let cache = DeduplicationCache::new(Duration::from_secs(30));

    assert!(!cache.is_duplicate("Alice", "Hello there"));
    assert!(cache.is_duplicate("  ALICE ", "hello there  "));
    assert!(!cache.is_duplicate("Alice", "Hello again"));
    assert_eq!(cache.size(), 2);

    cache.clear();
    assert_eq!(cache.size(), 0);
    assert!(!cache.is_duplicate("Alice", "Hello there"));
}

#[test]
fn test_dedup_window_expires() {
    let cache = DeduplicationCache::new(Duration::from_millis(50));

    assert!(!cache.is_duplicate("Alice", "ping"));
    thread::sleep(Duration::from_millis(120));
    assert!(!cache.is_duplicate("Alice", "ping"));
    assert!(cache.is_duplicate("Alice", "ping"));
}

#[test]
fn test_dedup_concurrent_first_sighting_wins_once() {
    let cache = Arc::new(DeduplicationCache::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || !cache.is_duplicate("Carol", "ping"))
        })
        .collect();

    let fresh = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|fresh| *fresh)
        .count();
    assert_eq!(fresh, 1);
}

#[test]
fn test_fingerprint_shape() {
    let fp = fingerprint("Alice", "Hello");
    assert_eq!(fp.len(), 16);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(fp, fingerprint(" alice", "HELLO "));
    assert_ne!(fp, fingerprint("Alice", "Hello!"));
}

#[test]
fn test_default_bot_filter() {
    let filter = BotFilter::default();

    assert!(filter.is_bot("Slackbot", "Reminder: standup"));
    assert!(filter.is_bot("GitHub App", "PR merged"));
    assert!(filter.is_bot("Alice", "Bob has joined the channel"));
    assert!(!filter.is_bot("Abbott", "lunch?"));
    assert!(!filter.is_bot("Alice", "Let's ship it"));
}

#[test]
fn test_bot_filter_from_config() {
    let yaml = r#"
filters:
  bot_patterns: ["^jira"]
  bot_keywords: ["[automated]"]
  dedup_window_seconds: 5
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let filter = config.bot_filter().unwrap();

    assert!(filter.is_bot("JIRA Cloud", "ticket updated"));
    assert!(filter.is_bot("Alice", "[Automated] weekly digest"));
    // Custom lists replace the defaults
    assert!(!filter.is_bot("deploy-bot", "done"));
    assert_eq!(config.dedup_cache().window(), Duration::from_secs(5));
}

#[test]
fn test_invalid_bot_pattern_is_rejected() {
    let mut config = Config::default();
    config.filters.bot_patterns = vec!["(unclosed".to_string()];
    assert!(config.bot_filter().is_err());
}
