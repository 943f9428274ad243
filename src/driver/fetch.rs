use std::time::{Duration, Instant};

use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};

use super::DriverError;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("marriage_harvester/", env!("CARGO_PKG_VERSION"));

/// Where the static driver gets its HTML from.
pub enum Fetcher {
    /// Plain HTTP GET; scripts on the page never run.
    Direct(reqwest::Client),
    /// spider.cloud returns the raw HTML of the page it rendered.
    Spider(Spider),
}

impl Fetcher {
    pub fn direct() -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DriverError::Browser(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::Direct(client))
    }

    pub fn spider(api_key: String) -> Result<Self, DriverError> {
        let spider = Spider::new(Some(api_key))
            .map_err(|e| DriverError::Browser(format!("failed to create Spider client: {}", e)))?;
        Ok(Self::Spider(spider))
    }

    /// spider.cloud when `SPIDER_API_KEY` is set, plain HTTP otherwise.
    pub fn from_env() -> Result<Self, DriverError> {
        match std::env::var("SPIDER_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::spider(key),
            _ => Self::direct(),
        }
    }

    /// Fetch a page, backing off on rate limits and server errors.
    pub async fn fetch_html(&self, url: &str) -> Result<String, DriverError> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = self.fetch_once(url).await;
            debug!(
                "fetched {} in {}ms (attempt {})",
                url,
                start.elapsed().as_millis(),
                attempt + 1
            );

            let reason = match result {
                Ok(html) => return Ok(html),
                Err(reason) => reason,
            };

            if !should_retry(&reason) || attempt == MAX_RETRIES {
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason,
                });
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "{} on {} (attempt {}/{}), backing off {:.1}s",
                reason,
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, String> {
        match self {
            Self::Direct(client) => {
                let response = client.get(url).send().await.map_err(|e| e.to_string())?;
                let status = response.status();
                if !status.is_success() {
                    return Err(format!("HTTP {}", status.as_u16()));
                }
                response.text().await.map_err(|e| e.to_string())
            }
            Self::Spider(spider) => {
                let params = RequestParams {
                    return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
                    ..Default::default()
                };
                let value = spider
                    .scrape_url(url, Some(params), "application/json")
                    .await
                    .map_err(|e| e.to_string())?;
                spider_content(value)
            }
        }
    }
}

/// Pull the page body out of a spider.cloud response.
fn spider_content(value: serde_json::Value) -> Result<String, String> {
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(value.clone()),
        None => value,
    };

    let first = parsed.as_array().and_then(|arr| arr.first());

    if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_i64()) {
        if status >= 400 {
            return Err(format!("HTTP {}", status));
        }
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| "no content in spider response".to_string())
}

fn should_retry(reason: &str) -> bool {
    reason.contains("429")
        || reason.contains("rate")
        || reason.contains("500")
        || reason.contains("502")
        || reason.contains("503")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_rate_limits_and_server_errors() {
        assert!(should_retry("HTTP 429"));
        assert!(should_retry("HTTP 503"));
        assert!(!should_retry("HTTP 404"));
        assert!(!should_retry("no content in spider response"));
    }

    #[test]
    fn spider_content_from_array() {
        let v = serde_json::json!([{ "content": "<html></html>", "status": 200 }]);
        assert_eq!(spider_content(v).unwrap(), "<html></html>");
    }

    #[test]
    fn spider_content_from_string_payload() {
        let v = serde_json::Value::String(r#"[{"content":"<p>x</p>"}]"#.into());
        assert_eq!(spider_content(v).unwrap(), "<p>x</p>");
    }

    #[test]
    fn spider_error_status() {
        let v = serde_json::json!([{ "content": "", "status": 503 }]);
        assert_eq!(spider_content(v).unwrap_err(), "HTTP 503");
    }
}
