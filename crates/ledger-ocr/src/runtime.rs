use std::path::Path;
use std::time::Duration;

use ledger_core::config::Settings;
use ledger_core::model::OcrCell;
use ledger_core::{Error, Result};
use ledger_resilience::{CircuitBreaker, CircuitBreakerConfig, TokenBucket};

use crate::provider::{OcrProvider, ProviderError};
use crate::providers::{AzureLayoutProvider, TesseractLocalProvider, TextractProvider};
use crate::select::resolve_provider_name;

/// Wraps a chosen provider with a circuit breaker and a per-provider token
/// bucket (spec §4.8): `breaker.allow() -> limiter.acquire() -> provider.call
/// -> success|failure`, retrying rate-limit responses with
/// `max(retry_after, exponential_backoff)` capped at `backoff_max`.
pub struct OcrRuntime {
    provider: Box<dyn OcrProvider>,
    rate_limiter: Option<TokenBucket>,
    breaker: CircuitBreaker,
    max_retries: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl OcrRuntime {
    pub fn new(
        provider: Box<dyn OcrProvider>,
        rate_limiter: Option<TokenBucket>,
        breaker_config: CircuitBreakerConfig,
        max_retries: u32,
        backoff_initial: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            provider,
            rate_limiter,
            breaker: CircuitBreaker::new(breaker_config),
            max_retries,
            backoff_initial,
            backoff_max: backoff_max.max(backoff_initial),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// A page-count preflight using `pdfinfo` (poppler-utils, alongside the
    /// `pdftoppm` already used by the tesseract provider). Missing tool or
    /// unparsable output skips the preflight rather than failing the job.
    async fn preflight_page_count(document_path: &Path) -> Option<i32> {
        let bin = which::which("pdfinfo").ok()?;
        let output = tokio::process::Command::new(bin)
            .arg(document_path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines()
            .find_map(|line| line.strip_prefix("Pages:"))
            .and_then(|v| v.trim().parse::<i32>().ok())
    }

    pub async fn extract_cells(
        &self,
        document_path: &Path,
        max_pages: Option<i32>,
        timeout_ms: Option<u64>,
    ) -> Result<Vec<OcrCell>> {
        self.breaker.allow()?;

        if let Some(limit) = max_pages {
            if let Some(actual) = Self::preflight_page_count(document_path).await {
                if actual > limit {
                    return Err(Error::InvalidInput(format!(
                        "document has {actual} pages which exceeds the configured limit of {limit}"
                    )));
                }
            }
        }

        let mut attempt = 0u32;
        let mut delay = self.backoff_initial;
        loop {
            if let Some(limiter) = &self.rate_limiter {
                let wait = limiter.consume(1.0);
                if wait > Duration::ZERO {
                    tokio::time::sleep(wait).await;
                }
            }

            match self.provider.extract_cells(document_path, max_pages, timeout_ms).await {
                Ok(cells) => {
                    self.breaker.record_success();
                    return Ok(cells);
                }
                Err(ProviderError::RateLimited { retry_after }) => {
                    self.breaker.record_failure();
                    if attempt >= self.max_retries {
                        return Err(Error::Throttled(format!(
                            "{} throttled after {attempt} retries",
                            self.provider.name()
                        )));
                    }
                    let backoff = retry_after.unwrap_or(delay).min(self.backoff_max);
                    tracing::warn!(provider = self.provider.name(), wait_ms = backoff.as_millis() as u64, "ocr provider throttled, retrying");
                    tokio::time::sleep(backoff).await;
                    delay = (delay * 2).min(self.backoff_max);
                    attempt += 1;
                }
                Err(ProviderError::Other(e)) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }
    }
}

fn rate_for_provider(settings: &Settings, provider: &str) -> f64 {
    match provider {
        "azure" => settings.ocr_tps_azure,
        "textract" => settings.ocr_tps_textract,
        _ => 0.0,
    }
}

async fn make_provider(settings: &Settings, provider: &str) -> Result<Box<dyn OcrProvider>> {
    match provider {
        "azure" => {
            let endpoint = settings
                .azure_di_endpoint
                .clone()
                .ok_or_else(|| Error::InvalidInput("Azure Document Intelligence credentials are missing".into()))?;
            let key = settings
                .azure_di_key
                .clone()
                .ok_or_else(|| Error::InvalidInput("Azure Document Intelligence credentials are missing".into()))?;
            Ok(Box::new(AzureLayoutProvider::new(endpoint, key)?))
        }
        "textract" => {
            let region = settings
                .aws_textract_region
                .clone()
                .ok_or_else(|| Error::InvalidInput("AWS_TEXTRACT_REGION is required for Textract".into()))?;
            Ok(Box::new(
                TextractProvider::new(
                    region,
                    settings.aws_access_key_id.clone(),
                    settings.aws_secret_access_key.clone(),
                )
                .await?,
            ))
        }
        "tesseract" => Ok(Box::new(TesseractLocalProvider::new(settings.tesseract_lang.clone())?)),
        other => Err(Error::InvalidInput(format!("unsupported OCR provider: {other}"))),
    }
}

/// Resolves the provider per `OCR_PROVIDER_MODE`/metadata, constructs it, and
/// wraps it in an `OcrRuntime` configured from `Settings`.
pub async fn build_runtime(settings: &Settings, metadata: &serde_json::Value) -> Result<OcrRuntime> {
    let (provider_name, _decision) = resolve_provider_name(settings, metadata)?;
    let provider = make_provider(settings, &provider_name).await?;

    let rate = rate_for_provider(settings, &provider_name);
    let rate_limiter = if rate > 0.0 {
        Some(TokenBucket::new(rate, None))
    } else {
        None
    };

    let breaker_config = CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout: Duration::from_secs(settings.ocr_circuit_open_secs),
        success_threshold: 2,
    };

    Ok(OcrRuntime::new(
        provider,
        rate_limiter,
        breaker_config,
        settings.ocr_max_retries,
        Duration::from_secs(1),
        Duration::from_secs(settings.ocr_circuit_open_secs.max(1)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl OcrProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn extract_cells(
            &self,
            _document_path: &Path,
            _max_pages: Option<i32>,
            _timeout_ms: Option<u64>,
        ) -> crate::provider::ProviderResult<Vec<OcrCell>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(ProviderError::RateLimited {
                    retry_after: Some(Duration::from_millis(1)),
                });
            }
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn retries_on_rate_limit_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Box::new(FlakyProvider {
            calls: calls.clone(),
            fail_times: 2,
        });
        let runtime = OcrRuntime::new(
            provider,
            None,
            CircuitBreakerConfig {
                failure_threshold: 10,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
            5,
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let result = runtime.extract_cells(Path::new("/tmp/does-not-matter.pdf"), None, None).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Box::new(FlakyProvider {
            calls: calls.clone(),
            fail_times: 100,
        });
        let runtime = OcrRuntime::new(
            provider,
            None,
            CircuitBreakerConfig {
                failure_threshold: 10,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
            2,
            Duration::from_millis(1),
            Duration::from_millis(5),
        );
        let result = runtime.extract_cells(Path::new("/tmp/does-not-matter.pdf"), None, None).await;
        assert!(matches!(result, Err(Error::Throttled(_))));
    }
}
