pub mod blacklist;
pub mod heuristics;

pub use blacklist::BlacklistMatcher;
pub use heuristics::HeuristicScorer;

use url::Url;

/// Lowercased hostname of an already parsed URL, without IPv6 brackets.
pub fn hostname(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_lowercase())
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname() {
        let url = Url::parse("https://Sub.Example.COM/path").unwrap();
        assert_eq!(hostname(&url), Some("sub.example.com".to_string()));

        let url = Url::parse("http://[::1]:8080/").unwrap();
        assert_eq!(hostname(&url), Some("::1".to_string()));

        let url = Url::parse("mailto:user@example.com").unwrap();
        assert_eq!(hostname(&url), None);
    }
}
