use std::time::Duration;

/// Delay between consecutive failed spawns: 1s, 2s, 4s, 8s, ...
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    secs: u64,
}

impl Backoff {
    /// Delay to wait before the next attempt; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        if self.secs == 0 {
            self.secs = 1;
        }
        let delay = Duration::from_secs(self.secs);
        self.secs = self.secs.saturating_mul(2);
        delay
    }

    pub fn reset(&mut self) {
        self.secs = 0;
    }

    /// Seconds the next failure will wait, 0 when nothing failed yet.
    pub fn current(&self) -> u64 {
        self.secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_from_one_second() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.current(), 0);
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.current(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_saturates() {
        let mut backoff = Backoff { secs: u64::MAX };
        assert_eq!(backoff.next_delay(), Duration::from_secs(u64::MAX));
        assert_eq!(backoff.current(), u64::MAX);
    }
}
