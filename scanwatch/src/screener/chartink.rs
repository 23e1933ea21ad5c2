//! Chartink-style screener over HTTP.
//!
//! Each fetch runs in its own cookie session: the scanner page sets the
//! session cookie that the anti-forgery token is bound to.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use scanwatch_common::config::ScreenerConfig;

use super::table::{rank_rows, TableShape};
use super::{ScanOutcome, ScanQuery, Screener, ScreenerError};

/// Screener client for the Chartink scan protocol.
pub struct ChartinkScreener {
    process_url: String,
    timeout: Duration,
    headers: HeaderMap,
    shape: TableShape,
}

impl ChartinkScreener {
    pub fn new(config: &ScreenerConfig) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, v);
        }
        if let Ok(v) = HeaderValue::from_str(&config.referer) {
            headers.insert(REFERER, v);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );

        Self {
            process_url: config.process_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            headers,
            shape: TableShape::from(config),
        }
    }

    /// Fresh client with its own cookie jar.
    fn session(&self) -> Result<reqwest::Client, ScreenerError> {
        reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(self.headers.clone())
            .timeout(self.timeout)
            .build()
            .map_err(|e| ScreenerError::Transport(format!("failed to build HTTP client: {}", e)))
    }

    async fn fetch_table(&self, query: &ScanQuery) -> Result<Value, ScreenerError> {
        let session = self.session()?;

        let page = session
            .get(&query.scanner_url)
            .send()
            .await
            .map_err(transport_error)?;
        if !page.status().is_success() {
            return Err(ScreenerError::Http {
                stage: "scanner page",
                status: page.status().as_u16(),
            });
        }
        let html = page.text().await.map_err(transport_error)?;

        let token = extract_csrf_token(&html).ok_or(ScreenerError::MissingToken)?;
        debug!(scanner_url = %query.scanner_url, "Acquired anti-forgery token");

        let response = session
            .post(&self.process_url)
            .header("x-csrf-token", token)
            .header("x-requested-with", "XMLHttpRequest")
            .form(&[("scan_clause", query.payload.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ScreenerError::Http {
                stage: "scan request",
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| ScreenerError::Malformed(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ScreenerError {
    if e.is_timeout() {
        ScreenerError::Transport(format!("request timed out: {}", e))
    } else {
        ScreenerError::Transport(e.to_string())
    }
}

/// Read the `content` of the `csrf-token` meta element.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("[name='csrf-token']").ok()?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Screener for ChartinkScreener {
    async fn fetch_ranked_symbols(&self, query: &ScanQuery) -> ScanOutcome {
        let outcome = match self.fetch_table(query).await {
            Ok(body) => rank_rows(&body, &self.shape),
            Err(e) => ScanOutcome::Failed(e),
        };

        match &outcome {
            ScanOutcome::Rows(result) => {
                info!(
                    scanner_url = %query.scanner_url,
                    count = result.matched(),
                    kept = result.len(),
                    "Number of stocks found"
                );
            }
            ScanOutcome::Empty { reason } => {
                warn!(scanner_url = %query.scanner_url, reason = %reason, "No data returned from screener");
            }
            ScanOutcome::Failed(ScreenerError::MissingField { field }) => {
                warn!(scanner_url = %query.scanner_url, field = %field, "Required column missing");
            }
            ScanOutcome::Failed(ScreenerError::MissingToken) => {
                warn!(scanner_url = %query.scanner_url, "CSRF token not found");
            }
            ScanOutcome::Failed(e) => {
                error!(scanner_url = %query.scanner_url, error = %e, "Error fetching stocks");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_csrf_token_from_meta() {
        let html = r#"<!doctype html><html><head>
            <meta charset="utf-8">
            <meta name="csrf-token" content="  abc123XYZ  ">
            </head><body></body></html>"#;
        assert_eq!(extract_csrf_token(html), Some("abc123XYZ".to_string()));
    }

    #[test]
    fn test_extract_csrf_token_content_before_name() {
        let html = r#"<html><head>
            <meta name="viewport" content="width=device-width">
            <meta content="tok" name="csrf-token" />
            </head></html>"#;
        assert_eq!(extract_csrf_token(html), Some("tok".to_string()));
    }

    #[test]
    fn test_extract_csrf_token_absent() {
        assert_eq!(extract_csrf_token("<html><head></head></html>"), None);
        assert_eq!(
            extract_csrf_token(r#"<meta name="csrf-token" content="">"#),
            None
        );
        assert_eq!(extract_csrf_token("not even html"), None);
    }

    #[test]
    fn test_new_uses_config_shape() {
        let config = ScreenerConfig {
            max_results: 5,
            ..Default::default()
        };
        let screener = ChartinkScreener::new(&config);
        assert_eq!(screener.shape.max_results, 5);
        assert_eq!(screener.process_url, config.process_url);
        assert!(screener.headers.contains_key(USER_AGENT));
    }
}
