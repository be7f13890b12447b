#![allow(clippy::uninlined_format_args)]

use safetab_guard::config::Config;
use safetab_guard::features::{hostname, BlacklistMatcher, HeuristicScorer};
use safetab_guard::request::parse_target_url;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Optional config path as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let scorer = HeuristicScorer::new(config.heuristics.clone());
    let blacklist = BlacklistMatcher::new(&config.blacklist);

    let samples = [
        "https://example.com/",
        "http://login-secure-bank.com/verify?acct=1",
        "http://user@192.168.1.10/signin",
        "https://phishing-site.net/offers",
        "https://a.b.c.d.e.f.example.com/",
        "https://very-bad-looking-host-name.example/",
        "https://docs.rust-lang.org/book/ch01-00-getting-started.html",
        "not a url",
    ];

    for raw in samples {
        println!("\n=== {} ===", raw);
        let url = match parse_target_url(raw) {
            Ok(url) => url,
            Err(e) => {
                println!("Rejected: {}", e);
                continue;
            }
        };

        let blacklisted = hostname(&url)
            .map(|host| blacklist.is_blacklisted(&host))
            .unwrap_or(false);
        let verdict = scorer.score(raw);

        println!("Blacklisted: {}", blacklisted);
        println!(
            "Heuristic score: {} (suspicious: {})",
            verdict.score, verdict.suspicious
        );
        for finding in &verdict.findings {
            println!("  - {}", finding);
        }
    }

    Ok(())
}
