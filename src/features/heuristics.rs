use super::hostname;
use crate::config::HeuristicConfig;
use crate::verdict::{push_unique, Finding, HeuristicVerdict};
use regex::Regex;
use url::Url;

/// Stateless weighted-rule scorer over a single URL string.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
    keywords: Vec<String>,
    ipv4_host: Regex,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            config,
            keywords,
            ipv4_host: Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap(),
        }
    }

    /// Score a raw URL. Unparsable input is not treated as a signal.
    pub fn score(&self, raw_url: &str) -> HeuristicVerdict {
        let url = match Url::parse(raw_url.trim()) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Heuristic scoring skipped for unparsable URL: {e}");
                return HeuristicVerdict::default();
            }
        };

        let weights = &self.config.weights;
        let mut score: i32 = 0;
        let mut findings = Vec::new();

        if raw_url.chars().count() > self.config.max_url_length {
            score = score.saturating_add(weights.long_url);
            push_unique(
                &mut findings,
                Finding::new(format!(
                    "URL is unusually long ({} characters).",
                    raw_url.chars().count()
                )),
            );
        }

        let matched = self.matched_keywords(raw_url);
        if !matched.is_empty() {
            score = score.saturating_add(if matched.len() > 1 {
                weights.multiple_keywords
            } else {
                weights.single_keyword
            });
            for keyword in &matched {
                push_unique(
                    &mut findings,
                    Finding::new(format!("URL contains suspicious keyword: \"{keyword}\".")),
                );
            }
        }

        let host = hostname(&url).unwrap_or_default();

        if host.matches('.').count() > self.config.max_hostname_dots {
            score = score.saturating_add(weights.hostname_dots);
            push_unique(
                &mut findings,
                Finding::new("Hostname contains an excessive number of subdomains."),
            );
        }

        if host.matches('-').count() > self.config.max_hostname_hyphens {
            score = score.saturating_add(weights.hostname_hyphens);
            push_unique(
                &mut findings,
                Finding::new("Hostname contains an excessive number of hyphens."),
            );
        }

        if url.scheme() != "https" {
            score = score.saturating_add(weights.insecure_scheme);
            push_unique(
                &mut findings,
                Finding::new("Connection is not secure (uses HTTP)."),
            );
        }

        if raw_url.contains('@') {
            score = score.saturating_add(weights.at_symbol);
            push_unique(
                &mut findings,
                Finding::new("URL contains an '@' symbol, which can hide the real destination."),
            );
        }

        if self.ipv4_host.is_match(&host) {
            score = score.saturating_add(weights.raw_ip_host);
            push_unique(
                &mut findings,
                Finding::new("Hostname is a raw IP address instead of a domain name."),
            );
        }

        let suspicious = score >= self.config.threshold;
        log::debug!("Heuristic score for {raw_url}: {score} (suspicious: {suspicious})");

        HeuristicVerdict {
            suspicious,
            score,
            findings: if suspicious { findings } else { Vec::new() },
        }
    }

    /// Distinct configured keywords found anywhere in the lowercased URL.
    fn matched_keywords(&self, raw_url: &str) -> Vec<&str> {
        let lowered = raw_url.to_lowercase();
        let mut matched: Vec<&str> = Vec::new();
        for keyword in &self.keywords {
            if lowered.contains(keyword.as_str()) {
                push_unique(&mut matched, keyword.as_str());
            }
        }
        matched
    }
}
