use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ledger_core::model::OcrCell;
use ledger_core::Error;

use crate::provider::{parse_numeric_hint, OcrProvider, ProviderError, ProviderResult};

const API_VERSION: &str = "2023-07-31";

/// Azure Document Intelligence Layout model, called directly over REST
/// (grounded on the original's `requests.Session().post(...)` call shape).
pub struct AzureLayoutProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl AzureLayoutProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> ledger_core::Result<Self> {
        let endpoint = endpoint.into();
        let api_key = api_key.into();
        if endpoint.is_empty() || api_key.is_empty() {
            return Err(Error::InvalidInput(
                "azure document intelligence endpoint/key are required".into(),
            ));
        }
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    async fn poll_operation(&self, url: &str, deadline: Duration) -> ProviderResult<serde_json::Value> {
        let started = tokio::time::Instant::now();
        let mut backoff = Duration::from_secs(1);
        loop {
            if started.elapsed() > deadline {
                return Err(ProviderError::Other(Error::Transient(
                    "azure document intelligence operation timed out".into(),
                )));
            }
            let response = self
                .client
                .get(url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .send()
                .await
                .map_err(|e| ProviderError::Other(Error::Transient(format!("azure poll failed: {e}"))))?;
            if response.status().as_u16() == 429 {
                let retry_after = retry_after_from_headers(response.headers());
                return Err(ProviderError::RateLimited { retry_after });
            }
            let data: serde_json::Value = response
                .error_for_status()
                .map_err(|e| ProviderError::Other(Error::Transient(format!("azure poll error: {e}"))))?
                .json()
                .await
                .map_err(|e| ProviderError::Other(Error::Transient(format!("azure poll decode failed: {e}"))))?;
            match data.get("status").and_then(|s| s.as_str()) {
                Some("succeeded") => return Ok(data),
                Some("failed") => {
                    return Err(ProviderError::Other(Error::Transient(
                        "azure document intelligence analysis failed".into(),
                    )))
                }
                _ => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(15));
                }
            }
        }
    }
}

#[async_trait]
impl OcrProvider for AzureLayoutProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn extract_cells(
        &self,
        document_path: &Path,
        _max_pages: Option<i32>,
        timeout_ms: Option<u64>,
    ) -> ProviderResult<Vec<OcrCell>> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(60_000));
        let payload = tokio::fs::read(document_path)
            .await
            .map_err(|e| ProviderError::Other(Error::InvalidInput(format!("read document failed: {e}"))))?;

        let url = format!(
            "{}/formrecognizer/documentModels/prebuilt-layout:analyze",
            self.endpoint
        );
        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/pdf")
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Other(Error::Transient(format!("azure request failed: {e}"))))?;

        if response.status().as_u16() == 429 {
            let retry_after = retry_after_from_headers(response.headers());
            return Err(ProviderError::RateLimited { retry_after });
        }
        if response.status().is_server_error() {
            return Err(ProviderError::Other(Error::Transient(format!(
                "azure document intelligence unavailable ({})",
                response.status()
            ))));
        }

        let result = if response.status().as_u16() == 202 {
            let operation_url = response
                .headers()
                .get("operation-location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    ProviderError::Other(Error::Transient(
                        "azure layout response missing operation-location header".into(),
                    ))
                })?;
            self.poll_operation(&operation_url, timeout).await?
        } else if response.status().is_success() {
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ProviderError::Other(Error::Transient(format!("azure decode failed: {e}"))))?
        } else {
            return Err(ProviderError::Other(Error::Transient(format!(
                "azure layout request failed: {}",
                response.status()
            ))));
        };

        let tables = result
            .pointer("/analyzeResult/tables")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ProviderError::Other(Error::Transient("azure layout response missing tables".into()))
            })?;

        let mut cells = Vec::new();
        for table in tables {
            let page = table_page_number(table);
            for cell in table.get("cells").and_then(|v| v.as_array()).into_iter().flatten() {
                let text = cell.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let (is_numeric, numeric_value) = parse_numeric_hint(&text);
                cells.push(OcrCell {
                    page,
                    row: cell.get("rowIndex").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                    column: cell.get("columnIndex").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                    text,
                    is_numeric,
                    numeric_value,
                });
            }
        }
        Ok(cells)
    }
}

fn table_page_number(table: &serde_json::Value) -> i32 {
    table
        .get("boundingRegions")
        .and_then(|v| v.as_array())
        .and_then(|regions| regions.first())
        .and_then(|region| region.get("pageNumber"))
        .and_then(|v| v.as_i64())
        .or_else(|| table.get("pageNumber").and_then(|v| v.as_i64()))
        .unwrap_or(1) as i32
}

fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}
