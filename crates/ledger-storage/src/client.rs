use std::sync::Arc;
use std::time::{Duration, Instant};

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use ledger_core::{Error, Result};
use ledger_resilience::{backoff_with_jitter, CircuitBreaker, CircuitBreakerConfig};
use tokio::sync::Mutex;

use crate::validation::ObjectValidation;

#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub size: i64,
    pub etag: String,
    pub content_type: String,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub items: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Object-store client fronted by a circuit breaker (spec §4.3). The S3
/// client handle is rebuilt every `client_refresh_interval` to pick up
/// rotated credentials, serialized under a mutex exactly like the original's
/// `_get_client`/`_client_lock`.
pub struct ObjectStoreClient {
    bucket: String,
    validation: ObjectValidation,
    breaker: Arc<CircuitBreaker>,
    client_refresh_interval: Duration,
    inner: Mutex<ClientSlot>,
    idempotent_retries: u32,
}

struct ClientSlot {
    client: Option<S3Client>,
    created_at: Option<Instant>,
}

impl ObjectStoreClient {
    pub async fn new(
        bucket: impl Into<String>,
        validation: ObjectValidation,
        breaker_config: CircuitBreakerConfig,
        client_refresh_interval: Duration,
        idempotent_retries: u32,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            validation,
            breaker: Arc::new(CircuitBreaker::new(breaker_config)),
            client_refresh_interval,
            inner: Mutex::new(ClientSlot {
                client: None,
                created_at: None,
            }),
            idempotent_retries,
        }
    }

    async fn client(&self) -> S3Client {
        let mut slot = self.inner.lock().await;
        let stale = slot
            .created_at
            .map(|t| t.elapsed() >= self.client_refresh_interval)
            .unwrap_or(true);
        if slot.client.is_none() || stale {
            tracing::info!("creating s3 client");
            let config = aws_config::load_from_env().await;
            slot.client = Some(S3Client::new(&config));
            slot.created_at = Some(Instant::now());
        }
        slot.client.clone().expect("client just set")
    }

    fn guard(&self) -> Result<()> {
        self.breaker.allow()
    }

    fn on_result<T>(&self, result: &std::result::Result<T, Error>) {
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if matches!(e, Error::NotFound(_) | Error::InvalidInput(_)) => {
                // Not a dependency failure; do not trip the breaker.
            }
            Err(_) => self.breaker.record_failure(),
        }
    }

    pub async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        size: i64,
        metadata: &std::collections::HashMap<String, String>,
        ttl: Duration,
    ) -> Result<String> {
        self.validation.validate_put(key, content_type, size)?;
        self.guard()?;
        let client = self.client().await;
        let mut req = client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(size);
        for (k, v) in metadata {
            req = req.metadata(k, v);
        }
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::InvalidInput(format!("invalid presign ttl: {e}")))?;
        let result = req
            .presigned(presign_config)
            .await
            .map(|p| p.uri().to_string())
            .map_err(|e| Error::Transient(format!("presign failed: {e}")));
        self.on_result(&result);
        result
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.validation.validate_key(key)?;
        self.with_retry(|| async {
            self.guard()?;
            let client = self.client().await;
            let result = client.get_object().bucket(&self.bucket).key(key).send().await;
            match result {
                Ok(out) => {
                    let bytes = out
                        .body
                        .collect()
                        .await
                        .map_err(|e| Error::Transient(format!("read body failed: {e}")))?
                        .into_bytes()
                        .to_vec();
                    Ok(bytes)
                }
                Err(e) => Err(classify_s3_error(e)),
            }
        })
        .await
    }

    pub async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: &std::collections::HashMap<String, String>,
    ) -> Result<()> {
        self.validation.validate_put(key, content_type, bytes.len() as i64)?;
        self.guard()?;
        let client = self.client().await;
        let mut req = client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(bytes.into());
        for (k, v) in metadata {
            req = req.metadata(k, v);
        }
        let result = req
            .send()
            .await
            .map(|_| ())
            .map_err(classify_s3_error);
        self.on_result(&result);
        result
    }

    pub async fn head(&self, key: &str) -> Result<ObjectMetadata> {
        self.validation.validate_key(key)?;
        self.with_retry(|| async {
            self.guard()?;
            let client = self.client().await;
            let result = client.head_object().bucket(&self.bucket).key(key).send().await;
            match result {
                Ok(out) => Ok(ObjectMetadata {
                    size: out.content_length().unwrap_or(0),
                    etag: out.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                    content_type: out.content_type().unwrap_or_default().to_string(),
                    last_modified: out
                        .last_modified()
                        .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0)),
                    metadata: out.metadata().cloned().unwrap_or_default(),
                }),
                Err(e) => Err(classify_s3_error(e)),
            }
        })
        .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.validation.validate_key(key)?;
        self.with_retry(|| async {
            self.guard()?;
            let client = self.client().await;
            client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map(|_| ())
                .map_err(classify_s3_error)
        })
        .await
    }

    pub async fn list(&self, prefix: &str, max: i32, cursor: Option<String>) -> Result<ListPage> {
        self.with_retry(|| async {
            self.guard()?;
            let client = self.client().await;
            let mut req = client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys(max);
            if let Some(token) = &cursor {
                req = req.continuation_token(token);
            }
            let result = req.send().await.map_err(classify_s3_error)?;
            let items = result
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect();
            Ok(ListPage {
                items,
                next_cursor: result.next_continuation_token().map(str::to_string),
            })
        })
        .await
    }

    /// Idempotent-call retry wrapper: exponential backoff + ±50% jitter on
    /// `Transient`/`Throttled` (spec §4.3). `put`/`presign_put` bypass this —
    /// they are not retried by default.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = op().await;
            self.on_result(&result);
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retriable() && attempt + 1 < self.idempotent_retries => {
                    let wait = backoff_with_jitter(Duration::from_millis(200), attempt, 0.5);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_s3_error<E: std::fmt::Display + ProvideErrorCode>(err: E) -> Error {
    let code = err.error_code().unwrap_or_default();
    if code == "NoSuchKey" || code == "NotFound" || code.contains("404") {
        Error::NotFound(format!("object not found: {err}"))
    } else if code.contains("Throttling") {
        Error::Throttled(format!("s3 throttled: {err}"))
    } else {
        Error::Transient(format!("s3 error: {err}"))
    }
}

trait ProvideErrorCode {
    fn error_code(&self) -> Option<String>;
}

impl<R, E> ProvideErrorCode for aws_sdk_s3::error::SdkError<E, R>
where
    E: std::error::Error + aws_sdk_s3::error::ProvideErrorMetadata,
{
    fn error_code(&self) -> Option<String> {
        self.as_service_error()
            .and_then(|e| e.code())
            .map(str::to_string)
    }
}
