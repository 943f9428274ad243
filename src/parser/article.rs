use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Selectors, Settings};
use crate::driver::{DriverError, ElementHandle, PageDriver};

/// First paragraphs longer than this belong to long-form articles, not
/// announcement posts.
pub const MAX_INTRO_CHARS: usize = 300;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Fields pulled from one announcement article, before person parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawArticle {
    pub location: String,
    pub date: String,
    pub person1: String,
    pub person2: String,
    pub children: String,
    pub where_met: String,
    pub image_url: String,
    pub url: String,
}

/// Why an article did not yield a record.
#[derive(Debug, thiserror::Error)]
pub enum ArticleSkip {
    #[error("article body has no paragraphs")]
    EmptyBody,
    #[error("first paragraph has {0} characters, not an announcement")]
    OversizedIntro(usize),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// What the extractor needs from the settings.
#[derive(Debug, Clone)]
pub struct ArticleRules<'a> {
    pub selectors: &'a Selectors,
    pub children_marker: &'a str,
}

impl<'a> From<&'a Settings> for ArticleRules<'a> {
    fn from(settings: &'a Settings) -> Self {
        Self {
            selectors: &settings.selectors,
            children_marker: &settings.children_marker,
        }
    }
}

/// Fetch and extract one article. Every failure is logged and becomes `None`.
pub async fn fetch_article<D: PageDriver>(
    driver: &mut D,
    url: &str,
    rules: &ArticleRules<'_>,
) -> Option<RawArticle> {
    match extract_article(driver, url, rules).await {
        Ok(raw) => Some(raw),
        Err(skip @ (ArticleSkip::EmptyBody | ArticleSkip::OversizedIntro(_))) => {
            debug!("skipping {}: {}", url, skip);
            None
        }
        Err(skip) => {
            warn!("could not extract {}: {}", url, skip);
            None
        }
    }
}

/// Navigate to `url` and pull the announcement fields out of the article.
pub async fn extract_article<D: PageDriver>(
    driver: &mut D,
    url: &str,
    rules: &ArticleRules<'_>,
) -> Result<RawArticle, ArticleSkip> {
    driver.navigate(url).await?;
    read_article(driver, url, rules).await
}

/// Extract from the page the driver currently shows; `url` is recorded as is.
pub async fn read_article<D: PageDriver>(
    driver: &mut D,
    url: &str,
    rules: &ArticleRules<'_>,
) -> Result<RawArticle, ArticleSkip> {
    let sel = rules.selectors;
    let paragraphs = driver.locate(&sel.article_body).await?;
    let Some(&first) = paragraphs.first() else {
        return Err(ArticleSkip::EmptyBody);
    };

    let person1 = driver
        .get_text(first)
        .await?
        .unwrap_or_default()
        .trim()
        .to_string();
    let intro_chars = person1.chars().count();
    if intro_chars > MAX_INTRO_CHARS {
        return Err(ArticleSkip::OversizedIntro(intro_chars));
    }

    let image_url = match driver.locate(&sel.article_image).await?.first() {
        Some(&img) => driver.get_attribute(img, "src").await?.unwrap_or_default(),
        None => String::new(),
    };
    let location = first_text(driver, &sel.article_location)
        .await?
        .ok_or(ArticleSkip::Missing("location label"))?;
    let date = first_text(driver, &sel.article_date)
        .await?
        .ok_or(ArticleSkip::Missing("date label"))?;

    let person2 = paragraph(driver, &paragraphs, 1)
        .await?
        .ok_or(ArticleSkip::Missing("second paragraph"))?;
    let third = paragraph(driver, &paragraphs, 2)
        .await?
        .ok_or(ArticleSkip::Missing("third paragraph"))?;

    let (children, where_met) = if third.contains(rules.children_marker) {
        let fourth = paragraph(driver, &paragraphs, 3).await?.unwrap_or_default();
        (third, fourth)
    } else {
        (String::new(), third)
    };

    Ok(RawArticle {
        location: collapse_whitespace(&location),
        date: collapse_whitespace(&date),
        person1,
        person2,
        children,
        where_met,
        image_url,
        url: url.to_string(),
    })
}

async fn paragraph<D: PageDriver>(
    driver: &mut D,
    paragraphs: &[ElementHandle],
    index: usize,
) -> Result<Option<String>, DriverError> {
    match paragraphs.get(index) {
        Some(&p) => driver.get_text(p).await,
        None => Ok(None),
    }
}

async fn first_text<D: PageDriver>(
    driver: &mut D,
    selector: &str,
) -> Result<Option<String>, DriverError> {
    match driver.locate(selector).await?.first() {
        Some(&el) => driver.get_text(el).await,
        None => Ok(None),
    }
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}
