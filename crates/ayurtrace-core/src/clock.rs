use std::time::{SystemTime, UNIX_EPOCH};

/// Source of server-side timestamps, in Unix seconds.
///
/// Records are always stamped from a `Clock`, never from caller input.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use fixed::FixedClock;

#[cfg(any(test, feature = "test-utils"))]
mod fixed {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use super::Clock;

    /// Manually driven clock for tests. Clones share the same time.
    #[derive(Debug, Clone, Default)]
    pub struct FixedClock {
        now: Arc<AtomicI64>,
    }

    impl FixedClock {
        pub fn new(now: i64) -> Self {
            Self {
                now: Arc::new(AtomicI64::new(now)),
            }
        }

        pub fn set(&self, now: i64) {
            self.now.store(now, Ordering::SeqCst);
        }

        pub fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-11-14
        assert!(SystemClock.now() > 1_700_000_000);
    }

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let clock = FixedClock::new(100);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now(), 105);
        other.set(7);
        assert_eq!(clock.now(), 7);
    }
}
