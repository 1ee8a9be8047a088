use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use tokio::sync::{Mutex, Semaphore};

/// Maximum attempts for a scheduled RPC call, including the first try.
/// Mirrors `TokenFetcher::MAX_RETRIES` but applied to every outbound call
/// rather than just multicall batches.
const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 200;

/// Process-wide, per-chain gate on outbound RPC traffic: enforces a minimum
/// spacing between requests and a bounded number of requests in flight, and
/// retries transient failures with exponential backoff plus jitter.
pub struct RequestScheduler {
    min_spacing: Duration,
    permits: Arc<Semaphore>,
    last_request_at: Arc<Mutex<Option<Instant>>>,
}

impl RequestScheduler {
    pub fn new(min_spacing_ms: u64, max_in_flight: usize) -> Self {
        Self {
            min_spacing: Duration::from_millis(min_spacing_ms),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            last_request_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs `f`, gated by spacing/concurrency, retrying while `is_transient`
    /// recognizes the error and attempts remain. `f` is called fresh on every
    /// attempt since the underlying request (an `eth_call`, a log fetch) is
    /// idempotent.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let permit = self
                .permits
                .acquire()
                .await
                .expect("request scheduler semaphore is never closed");
            self.wait_for_spacing().await;
            let result = f().await;
            drop(permit);

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < MAX_ATTEMPTS && is_transient(&err) => {
                    attempt += 1;
                    let backoff_ms = BASE_BACKOFF_MS * 2u64.saturating_pow(attempt - 1);
                    let jitter_ms = rand::thread_rng().gen_range(0..BASE_BACKOFF_MS);
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn wait_for_spacing(&self) {
        let mut last = self.last_request_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Recognizes retryable provider signals: HTTP 429, a body matching a known
/// rate-limit phrase (including the explorer API's `"max calls per sec"`
/// substring), or a plain request timeout.
pub fn is_transient(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("max calls per sec")
        || msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains("connection reset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let scheduler = RequestScheduler::new(0, 4);
        let attempts = AtomicU32::new(0);

        let result = scheduler
            .execute(|| async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(anyhow::anyhow!("429 too many requests"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let scheduler = RequestScheduler::new(0, 4);
        let attempts = AtomicU32::new(0);

        let result: Result<()> = scheduler
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("invalid abi decode"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
