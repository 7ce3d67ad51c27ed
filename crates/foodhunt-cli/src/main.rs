//! foodhunt command-line entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use foodhunt::ScrapeConfig;
use foodhunt_cli::config::{scan_config, BrowserArgs};
use foodhunt_cli::{doctor, logging, report};

#[derive(Parser)]
#[command(
    name = "foodhunt",
    about = "foodhunt: find menu items under a price threshold on a delivery search page",
    version,
    after_help = "Run 'foodhunt <command> --help' for details on each command."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a search results page and list items under the threshold
    Scan {
        /// Search results page URL
        url: String,
        /// Exclusive price ceiling (default 100, or FOODHUNT_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
        /// Do not visit restaurant pages for menus missing from the search capture
        #[arg(long)]
        no_follow: bool,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Scan restaurant pages directly and list items under the threshold
    Menus {
        /// Restaurant page URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Exclusive price ceiling (default 100, or FOODHUNT_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// List the restaurants a search results page returns
    Restaurants {
        /// Search results page URL
        url: String,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Check environment and diagnose issues
    Doctor {
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Serve /health, /restaurants and /deals over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Listen address (host:port)
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
        /// Maximum concurrent runs (one browser each)
        #[arg(long, default_value = "2")]
        max_runs: usize,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Scan { .. } => "scan",
            Commands::Menus { .. } => "menus",
            Commands::Restaurants { .. } => "restaurants",
            Commands::Doctor { .. } => "doctor",
            #[cfg(feature = "server")]
            Commands::Serve { .. } => "serve",
            Commands::Completions { .. } => "completions",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let json = cli.json;
    let command = cli.command.name();
    tracing::debug!(command, json, "dispatching");
    if let Err(e) = dispatch(cli.command, json).await {
        tracing::debug!(command, error = %e, "command failed");
        eprintln!("{}", report::render_error(&e, json));
        std::process::exit(report::exit_code(&e));
    }
}

async fn dispatch(command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Scan {
            url,
            threshold,
            no_follow,
            browser,
        } => {
            let config = scan_config(ScrapeConfig::from_env(), &browser, threshold, no_follow)?;
            let report = foodhunt::run_with_config(&url, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report::render_deals(&report));
            }
        }

        Commands::Menus {
            urls,
            threshold,
            browser,
        } => {
            let config = scan_config(ScrapeConfig::from_env(), &browser, threshold, false)?;
            let report = foodhunt::deals_for_pages(&urls, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report::render_deals(&report));
            }
        }

        Commands::Restaurants { url, browser } => {
            let config = browser.apply(ScrapeConfig::from_env());
            let restaurants = foodhunt::search_restaurants(&url, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&restaurants)?);
            } else {
                print!("{}", report::render_restaurants(&restaurants));
            }
        }

        Commands::Doctor { browser } => {
            let config = browser.apply(ScrapeConfig::from_env());
            doctor::run(&config, json)?;
        }

        #[cfg(feature = "server")]
        Commands::Serve {
            addr,
            max_runs,
            browser,
        } => {
            let config = browser.apply(ScrapeConfig::from_env());
            foodhunt_cli::server::serve(&addr, config, max_runs).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "foodhunt", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodhunt::SearchQuery;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_flags_parse() {
        let cli = Cli::try_parse_from([
            "foodhunt",
            "--json",
            "scan",
            "https://shopeefood.vn/ho-chi-minh/food/danh-sach-dia-diem?q=tra",
            "--threshold",
            "50",
            "--no-follow",
            "--max-tabs",
            "2",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Scan {
                url,
                threshold,
                no_follow,
                browser,
            } => {
                assert!(SearchQuery::parse(&url).is_ok());
                assert_eq!(threshold, Some(50.0));
                assert!(no_follow);
                assert_eq!(browser.max_tabs, Some(2));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_menus_takes_several_urls() {
        let cli = Cli::try_parse_from([
            "foodhunt",
            "menus",
            "https://shopeefood.vn/ho-chi-minh/quan-a",
            "https://shopeefood.vn/ho-chi-minh/quan-b",
            "--threshold",
            "20000",
        ])
        .unwrap();
        assert_eq!(cli.command.name(), "menus");
        match cli.command {
            Commands::Menus { urls, threshold, .. } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(threshold, Some(20000.0));
            }
            _ => panic!("expected menus"),
        }
    }

    #[test]
    fn test_menus_requires_a_url() {
        assert!(Cli::try_parse_from(["foodhunt", "menus"]).is_err());
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["foodhunt", "doctor"]).unwrap();
        assert_eq!(cli.command.name(), "doctor");
        let cli = Cli::try_parse_from(["foodhunt", "completions", "bash"]).unwrap();
        assert_eq!(cli.command.name(), "completions");
    }
}
