use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ListingPolicy, Settings};
use crate::driver::{DriverError, PageDriver};

static REPEATED_SLASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").unwrap());

/// How expansion of a listing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// The control stopped appearing: every entry is revealed.
    Exhausted { clicks: usize },
    /// Hit the click cap; the listing may hold more entries.
    Capped { clicks: usize },
    /// Ran out of the time budget; the listing may hold more entries.
    OutOfTime { clicks: usize },
}

impl Expansion {
    pub fn clicks(&self) -> usize {
        match *self {
            Self::Exhausted { clicks } | Self::Capped { clicks } | Self::OutOfTime { clicks } => {
                clicks
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpandLimits {
    pub settle: Duration,
    pub control_timeout: Duration,
    pub max_clicks: usize,
    pub budget: Duration,
}

impl From<&Settings> for ExpandLimits {
    fn from(settings: &Settings) -> Self {
        Self {
            settle: settings.settle(),
            control_timeout: settings.control_timeout(),
            max_clicks: settings.timing.max_expansions,
            budget: settings.expansion_budget(),
        }
    }
}

/// Click the "show more" control until it no longer shows up.
pub async fn expand_listing<D: PageDriver>(
    driver: &mut D,
    control: &str,
    limits: &ExpandLimits,
) -> Expansion {
    let started = Instant::now();
    let mut clicks = 0;

    loop {
        tokio::time::sleep(limits.settle).await;

        if clicks >= limits.max_clicks {
            warn!("stopped expanding after {} clicks (cap reached)", clicks);
            return Expansion::Capped { clicks };
        }
        if started.elapsed() >= limits.budget {
            warn!(
                "stopped expanding after {} clicks ({:.0}s budget spent)",
                clicks,
                limits.budget.as_secs_f64()
            );
            return Expansion::OutOfTime { clicks };
        }

        match driver.wait_visible(control, limits.control_timeout).await {
            Ok(true) => {}
            Ok(false) => return Expansion::Exhausted { clicks },
            Err(e) => {
                warn!("expansion control check failed: {}", e);
                return Expansion::Exhausted { clicks };
            }
        }

        let clicked = match driver.locate(control).await {
            Ok(handles) => match handles.first() {
                Some(&handle) => driver.click(handle).await,
                None => return Expansion::Exhausted { clicks },
            },
            Err(e) => Err(e),
        };
        if let Err(e) = clicked {
            warn!("could not click expansion control: {}", e);
            return Expansion::Exhausted { clicks };
        }

        clicks += 1;
        debug!("expanded listing ({} clicks)", clicks);
    }
}

/// Candidate identifiers from an expanded listing, in listing order.
///
/// `All` returns each entry's href verbatim. `NewlyMarried` keeps only
/// entries whose text contains `marker` and returns their canonical URL.
pub async fn candidate_links<D: PageDriver>(
    driver: &mut D,
    entry_selector: &str,
    policy: ListingPolicy,
    marker: &str,
    base: &Url,
) -> Result<Vec<String>, DriverError> {
    let entries = driver.locate(entry_selector).await?;
    let mut links = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(href) = driver.get_attribute(entry, "href").await? else {
            debug!("listing entry without href");
            continue;
        };

        match policy {
            ListingPolicy::All => links.push(href),
            ListingPolicy::NewlyMarried => {
                let descriptor = driver.get_text(entry).await?.unwrap_or_default();
                if !descriptor.contains(marker) {
                    continue;
                }
                match canonical_url(base, &href) {
                    Some(url) => links.push(url),
                    None => debug!("unresolvable listing href {}", href),
                }
            }
        }
    }

    Ok(links)
}

/// Absolute form of `href` used as the dedup key: resolved against `base`,
/// without fragment, with repeated slashes in the path collapsed.
///
/// `;` is the store delimiter, so it is always percent-encoded; the key
/// then reads back from the store unchanged.
pub fn canonical_url(base: &Url, href: &str) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);
    let path = REPEATED_SLASH_RE.replace_all(url.path(), "/").into_owned();
    url.set_path(&path);
    Some(url.as_str().replace(';', "%3B"))
}
