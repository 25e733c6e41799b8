//! Exponential backoff between retries.

use std::time::Duration;

/// Doubling backoff bounded by a minimum and maximum interval.
///
/// The first call to `next` returns the minimum; each following call doubles
/// the previous interval, capped at the maximum. `reset` restores the
/// initial state.
#[derive(Debug)]
pub struct ExponentialBackoff {
    minimum: Duration,
    maximum: Duration,
    current: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(minimum: Duration, maximum: Duration) -> Self {
        Self {
            minimum,
            maximum,
            current: None,
        }
    }

    /// The interval most recently returned by `next`, or the minimum if
    /// `next` has not been called since construction or the last `reset`.
    pub fn current(&mut self) -> Duration {
        *self.current.get_or_insert(self.minimum)
    }

    /// Advance to the next interval and return it.
    pub fn next(&mut self) -> Duration {
        let next = match self.current {
            None => self.minimum,
            Some(current) => (current * 2).min(self.maximum),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_maximum() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));

        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));
        // Capped at the maximum
        assert_eq!(backoff.next(), Duration::from_secs(10));
        assert_eq!(backoff.next(), Duration::from_secs(10));

        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_secs(1));
    }

    #[test]
    fn current_tracks_last_step() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(5));

        assert_eq!(backoff.current(), Duration::from_millis(50));
        backoff.next();
        backoff.next();
        assert_eq!(backoff.current(), Duration::from_millis(100));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(50));
    }
}
