use crate::config::BlacklistConfig;
use std::collections::HashSet;

pub const BLACKLIST_REASON: &str = "Domain is on a known local blacklist.";

/// Exact-match lookup against the configured domain set.
#[derive(Debug, Clone, Default)]
pub struct BlacklistMatcher {
    domains: HashSet<String>,
}

impl BlacklistMatcher {
    pub fn new(config: &BlacklistConfig) -> Self {
        Self::from_domains(config.domains.iter().map(String::as_str))
    }

    pub fn from_domains<'a, I>(domains: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn is_blacklisted(&self, hostname: &str) -> bool {
        let host = hostname.trim_end_matches('.').to_lowercase();
        self.domains.contains(&host)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blacklist() {
        let matcher = BlacklistMatcher::new(&BlacklistConfig::default());
        assert_eq!(matcher.len(), 3);
        assert!(matcher.is_blacklisted("phishing-site.net"));
        assert!(matcher.is_blacklisted("Scam-Domain.ORG"));
        assert!(matcher.is_blacklisted("malicious-example.com."));
        assert!(!matcher.is_blacklisted("example.com"));
    }

    #[test]
    fn test_exact_match_only() {
        let matcher = BlacklistMatcher::from_domains(["evil.example"]);
        assert!(matcher.is_blacklisted("evil.example"));
        assert!(!matcher.is_blacklisted("www.evil.example"));
        assert!(!matcher.is_blacklisted("notevil.example"));
        assert!(!matcher.is_blacklisted(""));
    }

    #[test]
    fn test_empty_entries_ignored() {
        let matcher = BlacklistMatcher::from_domains(["", "  "]);
        assert!(matcher.is_empty());
    }
}
