use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::{Duration, Instant};

/// How often a backoff sleep checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Bounded retry with exponential backoff.
///
/// The delay after failed attempt `n` (1-based) is
/// `initial_backoff * 2^(n-1)`, capped at `max_backoff`. With jitter enabled a
/// random extra of up to a quarter of the delay is added.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("retry max_attempts must be at least 1"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(anyhow!(
                "retry initial backoff ({:?}) exceeds max backoff ({:?})",
                self.initial_backoff,
                self.max_backoff
            ));
        }
        Ok(())
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra_ms = (delay.as_millis() / 4) as u64;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=extra_ms))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned.
    pub fn run<T>(&self, label: &str, op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        self.run_until_cancelled(label, || false, op)
    }

    /// Like `run`, but gives up as soon as `cancelled` reports true, both
    /// before each attempt and while backing off.
    pub fn run_until_cancelled<T>(
        &self,
        label: &str,
        cancelled: impl Fn() -> bool,
        mut op: impl FnMut(u32) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            if cancelled() {
                return Err(anyhow!(
                    "{} cancelled after {} attempt(s)",
                    label,
                    attempt - 1
                ));
            }
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => {
                    return Err(e.context(format!(
                        "{} failed after {} attempt(s)",
                        label, attempt
                    )));
                }
                Err(e) => {
                    let delay = self.jittered(self.backoff(attempt));
                    log::warn!(
                        "{} attempt {}/{} failed: {:#}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    sleep_unless_cancelled(delay, &cancelled);
                    attempt += 1;
                }
            }
        }
    }
}

fn sleep_unless_cancelled(delay: Duration, cancelled: &impl Fn() -> bool) {
    let deadline = Instant::now() + delay;
    while !cancelled() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter: true,
        }
    }
}
