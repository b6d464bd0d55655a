//! Event sources: where the events a sync pass evaluates come from.

mod ics;
mod json;

pub use ics::IcsDirSource;
pub use json::JsonFileSource;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::CalRulesResult;
use crate::event::Event;

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable description used in logs and CLI output.
    fn describe(&self) -> String;

    async fn fetch_events(&self) -> CalRulesResult<Vec<Event>>;
}

/// A fixed list of events.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSource {
    events: Vec<Event>,
}

impl MemoryEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        MemoryEventSource { events }
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    fn describe(&self) -> String {
        format!("{} in-memory events", self.events.len())
    }

    async fn fetch_events(&self) -> CalRulesResult<Vec<Event>> {
        Ok(self.events.clone())
    }
}

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Fetch events, retrying up to `max_retries` times with exponential
/// backoff. The last error is returned if every attempt fails.
pub async fn fetch_with_retries(source: &dyn EventSource, max_retries: u32) -> CalRulesResult<Vec<Event>> {
    let mut attempt = 0;
    loop {
        match source.fetch_events().await {
            Ok(events) => return Ok(events),
            Err(e) if attempt < max_retries => {
                let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                warn!(
                    source = %source.describe(),
                    attempt = attempt + 1,
                    "Fetching events failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalRulesError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventSource for Flaky {
        fn describe(&self) -> String {
            "flaky".into()
        }

        async fn fetch_events(&self) -> CalRulesResult<Vec<Event>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(CalRulesError::Source("unavailable".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let source = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        assert!(fetch_with_retries(&source, 3).await.is_ok());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let source = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        assert!(matches!(
            fetch_with_retries(&source, 2).await,
            Err(CalRulesError::Source(_))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }
}
