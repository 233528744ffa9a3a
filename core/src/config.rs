use anyhow::{Context, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Per-call limits applied by [`crate::client::DocumentStoreClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on a single remote call. Expiry counts as a network failure.
    pub timeout: Duration,
    /// Extra attempts after a network failure. Other failures are never retried.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each one after it.
    pub retry_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, max_retries: DEFAULT_MAX_RETRIES, retry_backoff: DEFAULT_RETRY_BACKOFF }
    }
}

impl ClientConfig {
    /// Read `REEL_TIMEOUT_MS`, `REEL_MAX_RETRIES` and `REEL_RETRY_BACKOFF_MS`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            timeout: Duration::from_millis(try_load("REEL_TIMEOUT_MS", DEFAULT_TIMEOUT.as_millis() as u64)?),
            max_retries: try_load("REEL_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_backoff: Duration::from_millis(try_load(
                "REEL_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            )?),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| {
                warn!("Invalid {key} value {raw:?}: {e}");
                anyhow::anyhow!("{e}")
            })
            .with_context(|| format!("parsing {key}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value: u32 = try_load("REEL_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn builders_override_defaults() {
        let config = ClientConfig::default()
            .with_timeout(Duration::from_millis(50))
            .with_retries(0, Duration::ZERO);
        assert_eq!(config.timeout, Duration::from_millis(50));
        assert_eq!(config.max_retries, 0);
    }
}
