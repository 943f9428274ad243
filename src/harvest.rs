use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::driver::PageDriver;
use crate::listing::{self, canonical_url, ExpandLimits};
use crate::parser::article::{self, ArticleRules};
use crate::parser::person;
use crate::record::Announcement;
use crate::store::{AnnouncementLog, KnownSet};

/// Counts for one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub sources: usize,
    pub failed_sources: usize,
    pub candidates: usize,
    pub already_known: usize,
    pub excluded: usize,
    pub skipped: usize,
    pub written: usize,
}

/// Dedup index for this run: the store's identifiers plus the exclusions,
/// all in canonical form.
pub fn known_set(log: &AnnouncementLog, settings: &Settings, base: &Url) -> KnownSet {
    KnownSet::new(
        log.urls().filter_map(|u| canonical_url(base, u)),
        settings
            .exclusions
            .iter()
            .filter_map(|u| canonical_url(base, u)),
    )
}

/// Walk every listing source in order and append each new announcement.
///
/// Stops early once `limit` new records were written.
pub async fn harvest<D: PageDriver>(
    driver: &mut D,
    settings: &Settings,
    sources: &[(String, String)],
    log: &mut AnnouncementLog,
    limit: Option<usize>,
) -> Result<HarvestStats> {
    let base = Url::parse(&settings.domain)
        .with_context(|| format!("Invalid domain {}", settings.domain))?;
    let mut known = known_set(log, settings, &base);
    info!(
        "{} announcements already stored, {} excluded",
        known.stored(),
        settings.exclusions.len()
    );

    let mut stats = HarvestStats::default();
    for (location, listing_url) in sources {
        stats.sources += 1;
        let Some(candidates) = collect_candidates(driver, settings, &base, listing_url).await
        else {
            stats.failed_sources += 1;
            continue;
        };
        info!("{}: {} candidates", location, candidates.len());
        stats.candidates += candidates.len();

        let pb = progress_bar(candidates.len());
        let done = process_candidates(
            driver,
            settings,
            &base,
            &candidates,
            &mut known,
            log,
            &mut stats,
            limit,
            &pb,
        )
        .await;
        pb.finish_and_clear();
        done?;

        if limit.is_some_and(|n| stats.written >= n) {
            info!("limit of {} new announcements reached", stats.written);
            break;
        }
    }

    Ok(stats)
}

/// Open, expand and filter one listing. `None` when the listing is unusable.
async fn collect_candidates<D: PageDriver>(
    driver: &mut D,
    settings: &Settings,
    base: &Url,
    listing_url: &str,
) -> Option<Vec<String>> {
    if let Err(e) = driver.navigate(listing_url).await {
        warn!("skipping listing {}: {}", listing_url, e);
        return None;
    }
    dismiss_consent(driver, &settings.selectors.consent, settings.consent_timeout()).await;

    let expansion = listing::expand_listing(
        driver,
        &settings.selectors.show_more,
        &ExpandLimits::from(settings),
    )
    .await;
    debug!(
        "{} expanded after {} clicks: {:?}",
        listing_url,
        expansion.clicks(),
        expansion
    );

    let links = match listing::candidate_links(
        driver,
        &settings.selectors.listing_entry,
        settings.policy,
        &settings.newly_married_marker,
        base,
    )
    .await
    {
        Ok(links) => links,
        Err(e) => {
            warn!("skipping listing {}: {}", listing_url, e);
            return None;
        }
    };

    let mut seen = HashSet::new();
    let candidates = links
        .into_iter()
        .filter_map(|href| {
            let url = canonical_url(base, &href);
            if url.is_none() {
                warn!("unresolvable listing link {}", href);
            }
            url
        })
        .filter(|url| seen.insert(url.clone()))
        .collect();
    Some(candidates)
}

#[allow(clippy::too_many_arguments)]
async fn process_candidates<D: PageDriver>(
    driver: &mut D,
    settings: &Settings,
    base: &Url,
    candidates: &[String],
    known: &mut KnownSet,
    log: &mut AnnouncementLog,
    stats: &mut HarvestStats,
    limit: Option<usize>,
    pb: &ProgressBar,
) -> Result<()> {
    let rules = ArticleRules::from(settings);

    for url in candidates {
        pb.inc(1);
        if known.is_excluded(url) {
            debug!("{} is excluded", url);
            stats.excluded += 1;
            continue;
        }
        if known.is_known(url) {
            stats.already_known += 1;
            continue;
        }

        let Some(raw) = article::fetch_article(driver, url, &rules).await else {
            stats.skipped += 1;
            continue;
        };
        if !person::is_templated(&raw.person1) || !person::is_templated(&raw.person2) {
            warn!("{}: person text does not follow the usual pattern", url);
        }

        let mut record = Announcement::from_raw(raw);
        // keep the stored key identical to the one read back next run
        if let Some(canonical) = canonical_url(base, &record.url) {
            record.url = canonical;
        }

        if log.ensure_header(&record)? {
            info!("started store {}", log.path().display());
        }
        log.append_row(&record)?;
        known.mark_known(&record.url);
        stats.written += 1;

        pb.println(format!(
            "{} & {} ({} saved)",
            record.person1.name, record.person2.name, stats.written
        ));

        if limit.is_some_and(|n| stats.written >= n) {
            break;
        }
    }
    Ok(())
}

async fn dismiss_consent<D: PageDriver>(driver: &mut D, selector: &str, timeout: Duration) {
    if !matches!(driver.wait_visible(selector, timeout).await, Ok(true)) {
        return;
    }
    let clicked = match driver.locate(selector).await {
        Ok(handles) => match handles.first() {
            Some(&h) => driver.click(h).await,
            None => Ok(()),
        },
        Err(e) => Err(e),
    };
    match clicked {
        Ok(()) => debug!("dismissed cookie consent"),
        Err(e) => debug!("could not dismiss cookie consent: {}", e),
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}
