// src/retry/strategy.rs

use crate::config::RetryConfig;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retries with a fixed pause between attempts.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `f` until it succeeds or `max_attempts` is reached. `f` receives
    /// the 1-based attempt number. There is no pause after the last attempt.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f(attempt).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        warn!("Retry failed after {} attempts: {}", attempt, error);
                        return Err(error);
                    }

                    debug!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt,
                        error,
                        self.config.delay()
                    );

                    sleep(self.config.delay()).await;
                }
            }
        }
    }
}
