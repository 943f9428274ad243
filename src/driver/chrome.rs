use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use tracing::debug;

use super::{DriverError, ElementHandle, PageDriver};

const TEXT_CONTENT_JS: &str = "function() { return this.textContent; }";
const VISIBLE_JS: &str = "function() { return this.checkVisibility(); }";

/// Driver backed by a local Chrome/Chromium over the DevTools protocol.
///
/// CDP calls block, so each one runs inside `block_in_place`; this needs
/// the multi-threaded tokio runtime.
pub struct ChromeDriver {
    // Keeps the browser process alive for as long as the tab is used.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    pub fn launch(headless: bool) -> Result<Self, DriverError> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .build()
            .map_err(|e| DriverError::Browser(format!("could not configure chrome: {}", e)))?;
        let browser = Browser::new(options).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn element(&self, handle: ElementHandle) -> Result<Element<'_>, DriverError> {
        let node_id = u32::try_from(handle.0).map_err(|_| DriverError::StaleHandle(handle))?;
        Element::new(&self.tab, node_id).map_err(|_| DriverError::StaleHandle(handle))
    }
}

fn browser_err(e: impl std::fmt::Display) -> DriverError {
    DriverError::Browser(format!("{:#}", e))
}

fn blocking<T>(f: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(f)
}

impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        debug!("navigating to {}", url);
        blocking(|| {
            self.tab
                .navigate_to(url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| DriverError::Navigation {
                    url: url.to_string(),
                    reason: format!("{:#}", e),
                })
        })
    }

    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        blocking(|| {
            // headless_chrome reports "no match" as an error.
            Ok(self
                .tab
                .find_elements(selector)
                .map(|found| {
                    found
                        .iter()
                        .map(|el| ElementHandle(u64::from(el.node_id)))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    async fn wait_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        blocking(|| {
            let Ok(element) = self
                .tab
                .wait_for_element_with_custom_timeout(selector, timeout)
            else {
                return Ok(false);
            };
            let visible = element
                .call_js_fn(VISIBLE_JS, vec![], false)
                .map_err(browser_err)?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(visible)
        })
    }

    async fn click(&mut self, handle: ElementHandle) -> Result<(), DriverError> {
        blocking(|| {
            self.element(handle)?.click().map_err(browser_err)?;
            Ok(())
        })
    }

    async fn get_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        blocking(|| {
            self.element(handle)?
                .get_attribute_value(name)
                .map_err(browser_err)
        })
    }

    async fn get_text(&mut self, handle: ElementHandle) -> Result<Option<String>, DriverError> {
        blocking(|| {
            let value = self
                .element(handle)?
                .call_js_fn(TEXT_CONTENT_JS, vec![], false)
                .map_err(browser_err)?
                .value;
            Ok(value.and_then(|v| v.as_str().map(str::to_string)))
        })
    }
}
