pub mod chrome;
#[cfg(test)]
pub mod fake;
pub mod fetch;
pub mod static_page;

use std::time::Duration;

pub use chrome::ChromeDriver;
pub use static_page::StaticDriver;

/// Opaque reference to an element located by a [`PageDriver`].
///
/// Only meaningful to the driver that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) u64);

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("element handle {0:?} is not known to this page")]
    StaleHandle(ElementHandle),
    #[error("no page loaded")]
    NoPage,
    #[error("unsupported on this driver: {0}")]
    Unsupported(&'static str),
    #[error("browser: {0}")]
    Browser(String),
}

/// Page automation capability the harvester runs on.
///
/// All fetches go through a driver; the harvester never issues raw HTTP.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// All elements currently matching `selector`, in document order.
    async fn locate(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;

    /// Whether an element matching `selector` is visible and interactable
    /// within `timeout`. Not finding one is `Ok(false)`, not an error.
    async fn wait_visible(&mut self, selector: &str, timeout: Duration)
        -> Result<bool, DriverError>;

    async fn click(&mut self, handle: ElementHandle) -> Result<(), DriverError>;

    async fn get_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// The element's text content.
    async fn get_text(&mut self, handle: ElementHandle) -> Result<Option<String>, DriverError>;
}
