use std::time::Duration;

/// Backoff between observe reconnect attempts.
///
/// Attempts are counted from the last successful connection: reaching the
/// streaming state resets the count.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Consecutive failed reconnects tolerated (`None` = keep trying).
    pub max_attempts: Option<u32>,
    /// Spread factor (0.0-1.0) applied to each delay.
    ///
    /// The spread is a fixed function of the attempt number, not random: it
    /// varies successive delays of one observation but every client computes
    /// the same delay for the same attempt, so it does not desynchronise
    /// clients that lost the same server at the same moment.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Give up after `max_attempts` consecutive failed reconnects.
    pub fn bounded(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Fail the observation on the first interruption.
    pub fn never() -> Self {
        Self {
            max_attempts: Some(0),
            ..Default::default()
        }
    }

    /// Fixed delay, no jitter. Mostly useful in tests.
    pub fn fixed(max_attempts: Option<u32>, delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Delay before reconnect number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi(attempt.saturating_sub(1).min(62) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).clamp(0.0, max_ms) as u64)
    }

    /// Whether reconnect number `attempt` (1-indexed) may be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}
