//! Rate governor: the single gate all outbound requests pass through.

use crate::config::RateConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct GovernorState {
    last_request: Option<Instant>,
    dispatched_in_batch: u32,
}

/// Global throttle enforcing the requests-per-second ceiling plus a forced
/// pause after every `batch_size` dispatched requests.
///
/// `acquire` suspends the caller until one more request may start; it never
/// drops or reorders requests and has no error conditions. The internal
/// window state is the only shared mutable resource in the engine, serialized
/// by the mutex held across the sleep so concurrent callers queue in order.
pub struct RateGovernor {
    min_gap: Duration,
    batch_size: u32,
    batch_pause: Duration,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            min_gap: config.request_delay(),
            batch_size: config.batch_size,
            batch_pause: config.batch_pause,
            state: Mutex::new(GovernorState {
                last_request: None,
                dispatched_in_batch: 0,
            }),
        }
    }

    /// Blocks until it is safe to start one more outbound request.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if self.batch_size > 0 && state.dispatched_in_batch >= self.batch_size {
            info!(pause_secs = self.batch_pause.as_secs_f64(), "batch pause");
            sleep(self.batch_pause).await;
            state.dispatched_in_batch = 0;
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_gap {
                let wait = self.min_gap - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate gate");
                sleep(wait).await;
            }
        }

        state.last_request = Some(Instant::now());
        state.dispatched_in_batch += 1;
    }
}
