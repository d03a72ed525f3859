//! Send throttle - token bucket gating outbound SMS

use smscast_common::config::SendingConfig;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

/// Slowest accepted rate: one send per hour
const MIN_PER_SECOND: f64 = 1.0 / 3600.0;

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or report how long until one is available
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.per_second))
        }
    }
}

/// Token bucket shared by every send of a process.
///
/// Uses tokio's clock, so tests running with paused time never really sleep.
#[derive(Debug)]
pub struct SendThrottle {
    bucket: Option<Mutex<Bucket>>,
}

impl SendThrottle {
    /// Allow `per_second` sends on average with bursts of up to `burst`.
    ///
    /// Non-positive or infinite rates disable throttling. Positive rates
    /// below one send per hour are raised to that floor.
    pub fn new(per_second: f64, burst: u32) -> Self {
        if !per_second.is_finite() || per_second <= 0.0 {
            return Self::unlimited();
        }
        let per_second = if per_second < MIN_PER_SECOND {
            warn!(per_second, "Send rate below one per hour; using one per hour");
            MIN_PER_SECOND
        } else {
            per_second
        };
        let capacity = f64::from(burst.max(1));
        Self {
            bucket: Some(Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                per_second,
                last_refill: Instant::now(),
            })),
        }
    }

    /// A throttle that never waits
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    pub fn from_config(config: &SendingConfig) -> Self {
        Self::new(config.messages_per_second, config.burst)
    }

    pub fn is_unlimited(&self) -> bool {
        self.bucket.is_none()
    }

    /// Wait until one send is allowed
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };

        loop {
            let wait = bucket.lock().await.try_take(Instant::now());
            match wait {
                None => return,
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Send throttled");
                    sleep(wait).await;
                }
            }
        }
    }
}

impl Default for SendThrottle {
    fn default() -> Self {
        Self::unlimited()
    }
}
