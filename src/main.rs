use clap::{Arg, Command};
use log::LevelFilter;
use safetab_guard::config::load_config_or_default;
use safetab_guard::{api, Config, VerdictOrchestrator};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("safetab-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Two-phase web page safety assessment service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/safetab-guard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-url")
                .long("check-url")
                .value_name("URL")
                .help("Run the fast check on a URL and print the verdict")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("URL")
                .help("Run deep content analysis on a URL (requires --content)")
                .requires("content")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("assess")
                .long("assess")
                .value_name("URL")
                .help("Run both phases and print the fast and final verdicts (requires --content)")
                .requires("content")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("content")
                .long("content")
                .value_name("FILE")
                .help("HTML file to analyze")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("api-server")
                .long("api-server")
                .help("Start the HTTP API server")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = match load_config_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };
    config.apply_env_overrides();

    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration validation failed: {e:#}");
        process::exit(1);
    }

    if matches.get_flag("test-config") {
        print_config_summary(&config);
        return;
    }

    let orchestrator = match VerdictOrchestrator::from_config(&config) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            eprintln!("Failed to initialize: {e:#}");
            process::exit(1);
        }
    };

    if let Some(url) = matches.get_one::<String>("check-url") {
        match orchestrator.fast_check(url).await {
            Ok(verdict) => print_json(&verdict),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(2);
            }
        }
        orchestrator.shutdown().await;
        return;
    }

    if let Some(url) = matches.get_one::<String>("analyze") {
        let content = read_content(&matches);
        match orchestrator.deep_analysis(url, &content).await {
            Ok(verdict) => print_json(&verdict),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(2);
            }
        }
        orchestrator.shutdown().await;
        return;
    }

    if let Some(url) = matches.get_one::<String>("assess") {
        let content = read_content(&matches);
        let assessment = match orchestrator.assess(url, content).await {
            Ok(assessment) => assessment,
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(2);
            }
        };
        println!("Fast verdict:");
        print_json(&assessment.fast);
        match assessment.deep.recv().await {
            Some(verdict) => {
                println!("Final verdict:");
                print_json(&verdict);
            }
            None => {
                eprintln!("❌ Deep analysis did not produce a verdict");
                process::exit(1);
            }
        }
        orchestrator.shutdown().await;
        return;
    }

    if matches.get_flag("api-server") {
        if let Err(e) = api::serve(&config.server, orchestrator).await {
            log::error!("{e:#}");
            process::exit(1);
        }
        return;
    }

    eprintln!("Nothing to do. Use --api-server, --check-url, --analyze or --assess (see --help).");
    process::exit(1);
}

fn generate_default_config(path: &str) {
    let yaml = match Config::default().to_yaml() {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Error serializing default configuration: {e}");
            process::exit(1);
        }
    };
    match std::fs::write(path, yaml) {
        Ok(()) => println!("Default configuration written to: {path}"),
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_config_summary(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Listen address: {}", config.server.listen_address);
    println!(
        "Heuristic threshold: {} ({} keywords)",
        config.heuristics.threshold,
        config.heuristics.keywords.len()
    );
    println!("Blacklisted domains: {}", config.blacklist.domains.len());
    println!(
        "Threat intel: {}",
        match (config.threat_intel.enabled, config.threat_intel.api_key.is_some()) {
            (false, _) => "disabled",
            (true, false) => "enabled, no API key (lookups skipped)",
            (true, true) => "enabled",
        }
    );
    println!(
        "Content analysis model: {}{}",
        config.content_analysis.model,
        if config.content_analysis.api_key.is_some() {
            ""
        } else {
            " (no API key, analysis fails safe)"
        }
    );
    println!("Cache TTL: {} hours", config.cache.ttl_hours);
    match &config.blocked_log.path {
        Some(path) => println!("Blocked-URL log: {path}"),
        None => println!("Blocked-URL log: disabled"),
    }
    println!("✅ Configuration is valid");
}

fn read_content(matches: &clap::ArgMatches) -> String {
    let path = matches.get_one::<String>("content").unwrap();
    match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading content file {path}: {e}");
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing verdict: {e}"),
    }
}
