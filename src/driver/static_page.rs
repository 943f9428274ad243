use std::time::Duration;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::fetch::Fetcher;
use super::{DriverError, ElementHandle, PageDriver};

/// Element state captured when it was located.
#[derive(Debug)]
struct Snapshot {
    text: String,
    attrs: Vec<(String, String)>,
}

impl Snapshot {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Loaded {
    url: Url,
    html: Html,
}

/// Driver over fetched HTML, queried with CSS selectors.
///
/// A static snapshot cannot run scripts, so only link-backed controls count
/// as interactable, and clicking one navigates to its link.
pub struct StaticDriver {
    fetcher: Fetcher,
    page: Option<Loaded>,
    // Snapshots of the current page only; handles keep counting across pages.
    elements: Vec<Snapshot>,
    first_handle: u64,
}

impl StaticDriver {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            page: None,
            elements: Vec::new(),
            first_handle: 0,
        }
    }

    /// Replace the current page with already fetched HTML.
    pub fn load_html(&mut self, url: &str, html: &str) -> Result<(), DriverError> {
        let url = Url::parse(url).map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.page = Some(Loaded {
            url,
            html: Html::parse_document(html),
        });
        self.first_handle += self.elements.len() as u64;
        self.elements.clear();
        Ok(())
    }

    fn snapshot(&self, handle: ElementHandle) -> Result<&Snapshot, DriverError> {
        handle
            .0
            .checked_sub(self.first_handle)
            .and_then(|i| self.elements.get(i as usize))
            .ok_or(DriverError::StaleHandle(handle))
    }

    fn select(&self, selector: &str) -> Result<Vec<Snapshot>, DriverError> {
        let page = self.page.as_ref().ok_or(DriverError::NoPage)?;
        let parsed =
            Selector::parse(selector).map_err(|_| DriverError::Selector(selector.to_string()))?;
        Ok(page
            .html
            .select(&parsed)
            .map(|el| Snapshot {
                text: el.text().collect(),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
            .collect())
    }
}

impl PageDriver for StaticDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let html = self.fetcher.fetch_html(url).await?;
        debug!("loaded {} ({} bytes)", url, html.len());
        self.load_html(url, &html)
    }

    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let found = self.select(selector)?;
        let start = self.first_handle + self.elements.len() as u64;
        let handles = (start..start + found.len() as u64)
            .map(ElementHandle)
            .collect();
        self.elements.extend(found);
        Ok(handles)
    }

    async fn wait_visible(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        Ok(self
            .select(selector)?
            .iter()
            .any(|el| el.attr("href").is_some()))
    }

    async fn click(&mut self, handle: ElementHandle) -> Result<(), DriverError> {
        let href = self
            .snapshot(handle)?
            .attr("href")
            .map(str::to_string)
            .ok_or(DriverError::Unsupported(
                "clicking a control without a link needs script execution",
            ))?;
        let base = &self.page.as_ref().ok_or(DriverError::NoPage)?.url;
        let target = base.join(&href).map_err(|e| DriverError::Navigation {
            url: href.clone(),
            reason: e.to_string(),
        })?;
        self.navigate(target.as_str()).await
    }

    async fn get_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.snapshot(handle)?.attr(name).map(str::to_string))
    }

    async fn get_text(&mut self, handle: ElementHandle) -> Result<Option<String>, DriverError> {
        Ok(Some(self.snapshot(handle)?.text.clone()))
    }
}
