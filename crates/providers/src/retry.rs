//! Provider retry: bounded exponential backoff around a single provider.
//!
//! Only transient failures (rate limiting, timeouts, network errors, 5xx)
//! are retried. Everything else is returned on the first attempt.

use async_trait::async_trait;
use siloed_core::error::ProviderError;
use siloed_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that retries its inner provider on transient failures.
pub struct RetryProvider {
    inner: Arc<dyn siloed_core::Provider>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryProvider {
    pub fn new(
        inner: Arc<dyn siloed_core::Provider>,
        max_retries: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff,
        }
    }

    /// Backoff before retry number `attempt` (1-based); doubles each time.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

#[async_trait]
impl siloed_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let mut attempt = 0;

        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = self.backoff(attempt);
                    warn!(
                        provider = %self.inner.name(),
                        error = %e,
                        attempt,
                        max_retries = self.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        "Retry: transient provider failure"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    if attempt > 0 {
                        info!(
                            provider = %self.inner.name(),
                            attempts = attempt + 1,
                            "Retry: giving up"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siloed_core::Provider;
    use std::sync::Mutex;

    /// Fails `failures` times with `error`, then succeeds.
    struct FlakyProvider {
        error: ProviderError,
        failures: usize,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(error: ProviderError, failures: usize) -> Self {
            Self {
                error,
                failures,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl siloed_core::Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> std::result::Result<GenerateResponse, ProviderError> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            if *count <= self.failures {
                return Err(self.error.clone());
            }
            Ok(GenerateResponse {
                text: "success".into(),
                input_tokens: 1,
                output_tokens: 1,
                model: "test-model".into(),
            })
        }
    }

    fn test_request() -> GenerateRequest {
        GenerateRequest::new("test", "system", "hello")
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::Network("conn reset".into()),
            2,
        ));
        let provider = RetryProvider::new(inner.clone(), 3, Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let result = provider.generate(test_request()).await;
        assert_eq!(result.unwrap().text, "success");
        assert_eq!(inner.calls(), 3);
        // 100ms + 200ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            },
            10,
        ));
        let provider = RetryProvider::new(inner.clone(), 2, Duration::from_millis(10));

        let result = provider.generate(test_request()).await;
        assert!(matches!(
            result,
            Err(ProviderError::ApiError {
                status_code: 503,
                ..
            })
        ));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::AuthenticationFailed("bad key".into()),
            1,
        ));
        let provider = RetryProvider::new(inner.clone(), 5, Duration::from_millis(10));

        let result = provider.generate(test_request()).await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn zero_retries_is_a_single_attempt() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::Timeout("slow".into()),
            1,
        ));
        let provider = RetryProvider::new(inner.clone(), 0, Duration::from_millis(10));

        assert!(provider.generate(test_request()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn backoff_doubles() {
        let inner = Arc::new(FlakyProvider::new(ProviderError::Timeout("t".into()), 0));
        let provider = RetryProvider::new(inner, 3, Duration::from_millis(500));
        assert_eq!(provider.backoff(1), Duration::from_millis(500));
        assert_eq!(provider.backoff(2), Duration::from_millis(1000));
        assert_eq!(provider.backoff(3), Duration::from_millis(2000));
        assert_eq!(provider.name(), "flaky");
    }
}
