//! Reconnection delay calculation.

use std::time::Duration;

/// Default multiplier applied to the reconnection delay after each loss.
pub const DEFAULT_GROWTH_RATE: f64 = 1.5;

/// Checks that a growth rate is finite and strictly greater than `1.0`.
pub(crate) fn validate_growth_rate(rate: f64) -> Result<(), String> {
    if !rate.is_finite() || rate <= 1.0 {
        return Err(format!("Growth rate must be finite and > 1.0, got {rate}"));
    }
    Ok(())
}

/// Per-connection backoff state.
///
/// The base interval is supplied on every call to
/// [`next_delay`](Self::next_delay) so that a `retry` field received on the
/// stream takes effect from the next scheduled delay onwards. With a constant
/// base `B` and rate `R` successive delays are `B, B·R, B·R², …`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectionPolicy {
    growth_rate: f64,
    additional_delay: Duration,
    max_delay: Option<Duration>,
}

impl ReconnectionPolicy {
    /// Create a policy with the given growth rate and an empty accumulator.
    pub fn new(growth_rate: f64) -> Self {
        Self {
            growth_rate,
            additional_delay: Duration::ZERO,
            max_delay: None,
        }
    }

    /// Cap every returned delay at `max_delay`.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Growth rate applied after each delay.
    pub fn growth_rate(&self) -> f64 {
        self.growth_rate
    }

    /// Current backoff accumulator.
    pub fn additional_delay(&self) -> Duration {
        self.additional_delay
    }

    /// Return the delay for the next reconnection attempt and grow the
    /// accumulator.
    pub fn next_delay(&mut self, base: Duration) -> Duration {
        let delay = base.saturating_add(self.additional_delay);

        let base_ms = base.as_secs_f64() * 1000.0;
        let grown_ms = self.growth_rate * delay.as_secs_f64() * 1000.0 - base_ms;
        self.additional_delay = if grown_ms.is_finite() && grown_ms > 0.0 {
            Duration::try_from_secs_f64(grown_ms / 1000.0).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Clear the accumulator. Called once on every successful open.
    pub fn reset(&mut self) {
        self.additional_delay = Duration::ZERO;
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GROWTH_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }

    #[test]
    fn test_geometric_sequence_with_constant_base() {
        let mut policy = ReconnectionPolicy::new(1.5);
        let base = Duration::from_millis(100);

        let delays: Vec<f64> = (0..4).map(|_| ms(policy.next_delay(base))).collect();

        let expected = [100.0, 150.0, 225.0, 337.5];
        for (got, want) in delays.iter().zip(expected) {
            assert!((got - want).abs() < 0.01, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut policy = ReconnectionPolicy::new(2.0);
        let base = Duration::from_millis(50);
        policy.next_delay(base);
        policy.next_delay(base);
        assert!(policy.additional_delay() > Duration::ZERO);

        policy.reset();
        assert_eq!(policy.additional_delay(), Duration::ZERO);
        assert_eq!(policy.next_delay(base), base);
    }

    #[test]
    fn test_changed_base_applies_to_next_delay() {
        let mut policy = ReconnectionPolicy::new(1.5);
        assert_eq!(
            policy.next_delay(Duration::from_millis(100)),
            Duration::from_millis(100)
        );
        // accumulator is 50ms; the new base is added on top of it
        let delay = policy.next_delay(Duration::from_millis(1000));
        assert!((ms(delay) - 1050.0).abs() < 0.01);
    }

    #[test]
    fn test_max_delay_caps_result() {
        let mut policy =
            ReconnectionPolicy::new(10.0).with_max_delay(Some(Duration::from_millis(500)));
        let base = Duration::from_millis(100);
        assert_eq!(policy.next_delay(base), base);
        assert_eq!(policy.next_delay(base), Duration::from_millis(500));
        assert_eq!(policy.next_delay(base), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_growth_rate() {
        assert!(validate_growth_rate(1.5).is_ok());
        assert!(validate_growth_rate(1.0).is_err());
        assert!(validate_growth_rate(0.5).is_err());
        assert!(validate_growth_rate(f64::NAN).is_err());
        assert!(validate_growth_rate(f64::INFINITY).is_err());
    }
}
