//! Bounded-retry helper used by the rendezvous channel's `open` and the
//! back-end's attach loop.

use std::thread::sleep;
use std::time::{Duration, Instant};

/// An exponential backoff with a hard deadline. Unlike a bare retry loop,
/// this makes "bounded sleep" concrete and testable without actually
/// waiting out a full timeout in unit tests.
pub struct Backoff {
    deadline: Instant,
    next: Duration,
    max_step: Duration,
}

impl Backoff {
    pub fn new(timeout: Duration) -> Self {
        Backoff {
            deadline: Instant::now() + timeout,
            next: Duration::from_millis(1),
            max_step: Duration::from_millis(50),
        }
    }

    /// Sleeps for the next backoff step and returns `false` once the
    /// deadline has passed (caller should give up and surface a timeout).
    pub fn wait(&mut self) -> bool {
        if Instant::now() >= self.deadline {
            return false;
        }
        sleep(self.next.min(self.max_step));
        self.next = (self.next * 2).min(self.max_step);
        true
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Retries `attempt` until it returns `Some`, or the backoff expires.
pub fn retry_until<T>(timeout: Duration, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
    if let Some(v) = attempt() {
        return Some(v);
    }
    let mut backoff = Backoff::new(timeout);
    loop {
        if !backoff.wait() {
            return attempt();
        }
        if let Some(v) = attempt() {
            return Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_until_succeeds_eventually() {
        let mut count = 0;
        let result = retry_until(Duration::from_millis(200), || {
            count += 1;
            if count >= 3 {
                Some(count)
            } else {
                None
            }
        });
        assert_eq!(result, Some(3));
    }

    #[test]
    fn retry_until_gives_up() {
        let result: Option<()> = retry_until(Duration::from_millis(5), || None);
        assert_eq!(result, None);
    }
}
