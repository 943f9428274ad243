//! Scripted in-memory driver for tests. Selectors match by exact string.

use std::collections::HashMap;
use std::time::Duration;

use super::{DriverError, ElementHandle, PageDriver};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: Option<String>,
    pub attrs: Vec<(String, String)>,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            attrs: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }
}

/// A page whose `control` selector reveals one more batch per click.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: Vec<(String, FakeElement)>,
    control: Option<String>,
    batches: Vec<Vec<(String, FakeElement)>>,
    clicked: usize,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements.push((selector.to_string(), element));
        self
    }

    pub fn with_control(mut self, selector: &str) -> Self {
        self.control = Some(selector.to_string());
        self
    }

    pub fn with_batch(mut self, batch: Vec<(&str, FakeElement)>) -> Self {
        self.batches.push(
            batch
                .into_iter()
                .map(|(s, e)| (s.to_string(), e))
                .collect(),
        );
        self
    }

    fn control_live(&self) -> bool {
        self.clicked < self.batches.len()
    }

    fn matching(&self, selector: &str) -> Vec<FakeElement> {
        let revealed = self.batches.iter().take(self.clicked).flatten();
        self.elements
            .iter()
            .chain(revealed)
            .filter(|(s, _)| s == selector)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Located {
    Element(FakeElement),
    Control,
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    located: Vec<(String, Located)>,
    pub visits: Vec<String>,
    pub clicks: usize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    fn current_page(&mut self) -> Result<&mut FakePage, DriverError> {
        let url = self.current.as_ref().ok_or(DriverError::NoPage)?;
        self.pages.get_mut(url).ok_or(DriverError::NoPage)
    }

    fn element(&self, handle: ElementHandle) -> Result<&(String, Located), DriverError> {
        self.located
            .get(handle.0 as usize)
            .ok_or(DriverError::StaleHandle(handle))
    }
}

impl PageDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.visits.push(url.to_string());
        if !self.pages.contains_key(url) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let url = self.current.clone().ok_or(DriverError::NoPage)?;
        let page = self.current_page()?;
        let mut found: Vec<Located> = page
            .matching(selector)
            .into_iter()
            .map(Located::Element)
            .collect();
        if page.control.as_deref() == Some(selector) && page.control_live() {
            found.push(Located::Control);
        }

        let start = self.located.len() as u64;
        let handles = (start..start + found.len() as u64)
            .map(ElementHandle)
            .collect();
        self.located
            .extend(found.into_iter().map(|l| (url.clone(), l)));
        Ok(handles)
    }

    async fn wait_visible(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        let page = self.current_page()?;
        if page.control.as_deref() == Some(selector) {
            return Ok(page.control_live());
        }
        Ok(!page.matching(selector).is_empty())
    }

    async fn click(&mut self, handle: ElementHandle) -> Result<(), DriverError> {
        let (url, located) = self.element(handle)?.clone();
        if !matches!(located, Located::Control) || self.current.as_deref() != Some(url.as_str()) {
            return Err(DriverError::Unsupported("fake elements are not clickable"));
        }
        self.current_page()?.clicked += 1;
        self.clicks += 1;
        Ok(())
    }

    async fn get_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        match &self.element(handle)?.1 {
            Located::Element(el) => Ok(el
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())),
            Located::Control => Ok(None),
        }
    }

    async fn get_text(&mut self, handle: ElementHandle) -> Result<Option<String>, DriverError> {
        match &self.element(handle)?.1 {
            Located::Element(el) => Ok(el.text.clone()),
            Located::Control => Ok(Some("Toon meer".to_string())),
        }
    }
}
