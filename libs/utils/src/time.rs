#[cfg(target_has_atomic = "64")]
pub use coarsetime::{Clock, Duration, Instant};

#[cfg(not(target_has_atomic = "64"))]
pub use std::time::{Duration, Instant};

#[cfg(not(target_has_atomic = "64"))]
pub struct Clock;

#[cfg(not(target_has_atomic = "64"))]
impl Clock {
    pub fn now_since_epoch() -> Duration {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(n) => n,
            Err(_) => panic!("SystemTime before UNIX EPOCH!"),
        }
    }

    pub fn recent_since_epoch() -> Duration {
        Clock::now_since_epoch()
    }

    pub fn update() {
        // Nothing to do here
    }
}

/// Milliseconds elapsed since the Unix epoch, as stamped on tasks, results and heartbeats.
#[inline]
pub fn epoch_millis() -> u64 {
    Clock::now_since_epoch().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_is_monotonic_enough() {
        let first = epoch_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = epoch_millis();

        assert!(first > 1_600_000_000_000);
        assert!(second >= first);
    }
}
