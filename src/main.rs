mod config;
mod driver;
mod harvest;
mod listing;
mod parser;
mod record;
mod store;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use config::{DriverKind, ListingPolicy, Settings};
use driver::fetch::Fetcher;
use driver::{ChromeDriver, PageDriver, StaticDriver};
use parser::article::{self, ArticleRules};
use record::Announcement;
use store::AnnouncementLog;

#[derive(Parser)]
#[command(
    name = "marriage_harvester",
    about = "Incremental harvester for hbvl.be marriage announcements"
)]
struct Cli {
    /// Settings file (default: ./harvest.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the listings and append new announcements to the store
    Run {
        /// Stop after this many new announcements
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Which listing entries to follow
        #[arg(long, value_enum)]
        policy: Option<ListingPolicy>,
        /// Page driver to use
        #[arg(long, value_enum)]
        driver: Option<DriverKind>,
        /// Only these locations (repeatable)
        #[arg(short, long = "location")]
        locations: Vec<String>,
    },
    /// Extract a single article and print it as JSON (nothing is stored)
    Article {
        url: String,
        #[arg(long, value_enum)]
        driver: Option<DriverKind>,
    },
    /// Parse one person sentence, e.g. "Jan (34) uit Genk, ingenieur"
    Person { sentence: String },
    /// Show store statistics
    Stats,
    /// Stored announcements as a table
    Overview {
        /// Filter by article location
        #[arg(short, long)]
        location: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run {
            limit,
            policy,
            driver,
            locations,
        } => {
            if let Some(p) = policy {
                settings.policy = p;
            }
            if let Some(d) = driver {
                settings.driver = d;
            }
            info!(settings = ?settings, msg = "Starting harvest");

            let sources: Vec<(String, String)> = settings
                .listing_sources()
                .into_iter()
                .filter(|(key, _)| locations.is_empty() || locations.contains(key))
                .collect();
            if sources.is_empty() {
                println!("No listing sources selected.");
                return Ok(());
            }

            let mut log = AnnouncementLog::open(&settings.store_path)?;
            if log.is_empty() {
                println!("Starting a new store at {}", settings.store_path.display());
            }
            println!(
                "Harvesting {} listings into {} ({} rows stored)...",
                sources.len(),
                settings.store_path.display(),
                log.rows().len()
            );

            let stats = match settings.driver {
                DriverKind::Chrome => {
                    let mut d = ChromeDriver::launch(settings.headless)?;
                    harvest::harvest(&mut d, &settings, &sources, &mut log, limit).await?
                }
                DriverKind::Static => {
                    let mut d = StaticDriver::new(Fetcher::from_env()?);
                    harvest::harvest(&mut d, &settings, &sources, &mut log, limit).await?
                }
            };

            println!(
                "Done: {} new, {} already stored, {} excluded, {} skipped ({} candidates from {} listings, {} failed).",
                stats.written,
                stats.already_known,
                stats.excluded,
                stats.skipped,
                stats.candidates,
                stats.sources,
                stats.failed_sources,
            );
            Ok(())
        }
        Commands::Article { url, driver } => {
            let kind = driver.unwrap_or(settings.driver);
            let found = match kind {
                DriverKind::Chrome => {
                    let mut d = ChromeDriver::launch(settings.headless)?;
                    extract_one(&mut d, &settings, &url).await
                }
                DriverKind::Static => {
                    let mut d = StaticDriver::new(Fetcher::from_env()?);
                    extract_one(&mut d, &settings, &url).await
                }
            };
            match found {
                Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                Err(reason) => println!("Not an announcement: {}", reason),
            }
            Ok(())
        }
        Commands::Person { sentence } => {
            let person = parser::person::parse(&sentence);
            println!("{}", serde_json::to_string_pretty(&person)?);
            if !parser::person::is_templated(&sentence) {
                println!("(sentence does not follow the \"Name (age) uit Place, job\" pattern)");
            }
            Ok(())
        }
        Commands::Stats => {
            let log = AnnouncementLog::open(&settings.store_path)?;
            let rows = log.rows();
            let unique: HashSet<&str> = log.urls().collect();
            let with_children = rows.iter().filter(|r| !r.get("children").is_empty()).count();
            println!("Store:       {}", settings.store_path.display());
            println!("Rows:        {}", rows.len());
            println!("Unique URLs: {}", unique.len());
            println!("Duplicates:  {}", log.urls().count() - unique.len());
            println!("Children:    {}", with_children);
            println!("Excluded:    {}", settings.exclusions.len());
            Ok(())
        }
        Commands::Overview { location, limit } => {
            let log = AnnouncementLog::open(&settings.store_path)?;
            let wanted = location.map(|l| l.to_lowercase());
            let rows: Vec<_> = log
                .rows()
                .iter()
                .filter(|r| {
                    wanted
                        .as_deref()
                        .map_or(true, |w| r.get("location").to_lowercase().contains(w))
                })
                .take(limit)
                .collect();
            if rows.is_empty() {
                println!("No announcements found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<18} | {:<14} | {:<22} | {:<22} | {:<30}",
                "#", "Date", "Location", "Person 1", "Person 2", "URL"
            );
            println!("{}", "-".repeat(124));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<18} | {:<14} | {:<22} | {:<22} | {:<30}",
                    i + 1,
                    truncate(r.get("date"), 18),
                    truncate(r.get("location"), 14),
                    truncate(&person_label(r.get("person1.name"), r.get("person1.age")), 22),
                    truncate(&person_label(r.get("person2.name"), r.get("person2.age")), 22),
                    truncate(r.url(), 30),
                );
            }
            println!("\n{} of {} announcements", rows.len(), log.rows().len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn extract_one<D: PageDriver>(
    driver: &mut D,
    settings: &Settings,
    url: &str,
) -> Result<Announcement, article::ArticleSkip> {
    let raw = article::extract_article(driver, url, &ArticleRules::from(settings)).await?;
    Ok(Announcement::from_raw(raw))
}

fn person_label(name: &str, age: &str) -> String {
    if age.is_empty() {
        name.to_string()
    } else {
        format!("{} ({})", name, age)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
