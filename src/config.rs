use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "harvest.toml";
const ENV_PREFIX: &str = "HARVEST";

/// Which listing entries become candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ListingPolicy {
    /// Every entry's link.
    All,
    /// Only entries whose descriptor carries the newly-married marker.
    NewlyMarried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// Headless Chrome; runs page scripts, so listings can be expanded.
    Chrome,
    /// Fetched HTML only (plain HTTP, or spider.cloud with SPIDER_API_KEY).
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub settle_ms: u64,
    pub control_timeout_ms: u64,
    pub consent_timeout_ms: u64,
    pub max_expansions: usize,
    pub expansion_budget_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: 1000,
            control_timeout_ms: 4000,
            consent_timeout_ms: 2000,
            max_expansions: 200,
            expansion_budget_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub consent: String,
    pub show_more: String,
    pub listing_entry: String,
    pub article_body: String,
    pub article_image: String,
    pub article_location: String,
    pub article_date: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            consent: "button#didomi-notice-agree-button".into(),
            show_more: r#"button[data-testid="show-more"]"#.into(),
            listing_entry: "section > div > div > ul > li > a".into(),
            article_body: r#"div[data-testid="article-body"] p"#.into(),
            article_image: r#"figure[data-testid="article-image-wrapper"] div div img"#.into(),
            article_location: r#"div[data-testid="article-intro"] span"#.into(),
            article_date: r#"time[data-testid="article-date"]"#.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub domain: String,
    pub area: String,
    pub listing_query: String,
    pub locations: Vec<String>,
    pub store_path: PathBuf,
    pub policy: ListingPolicy,
    pub newly_married_marker: String,
    pub children_marker: String,
    pub exclusions: Vec<String>,
    pub driver: DriverKind,
    pub headless: bool,
    pub timing: Timing,
    pub selectors: Selectors,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: "https://www.hbvl.be/".into(),
            area: "regio/".into(),
            listing_query: "?t=limburgtrouwt".into(),
            locations: [
                "beringen",
                "hasselt",
                "tongeren",
                "genk",
                "lommel",
                "sint-truiden",
                "maasmechelen",
            ]
            .map(String::from)
            .to_vec(),
            store_path: PathBuf::from("data/marriages.csv"),
            policy: ListingPolicy::All,
            newly_married_marker: "Pas getrouwd".into(),
            children_marker: "Kinderen".into(),
            exclusions: vec!["https://www.hbvl.be/cnt/dmf20240625_93485424".into()],
            driver: DriverKind::Chrome,
            headless: true,
            timing: Timing::default(),
            selectors: Selectors::default(),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (optional unless given explicitly), then
    /// `HARVEST_*` environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    /// `(location, listing url)` for each configured location, in order.
    pub fn listing_sources(&self) -> Vec<(String, String)> {
        self.locations
            .iter()
            .map(|key| {
                (
                    key.clone(),
                    format!("{}{}{}{}", self.domain, self.area, key, self.listing_query),
                )
            })
            .collect()
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.timing.settle_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.control_timeout_ms)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.consent_timeout_ms)
    }

    pub fn expansion_budget(&self) -> Duration {
        Duration::from_secs(self.timing.expansion_budget_secs)
    }
}
