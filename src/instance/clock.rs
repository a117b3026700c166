//! Wall-clock source for message timestamps
//!
//! `started_at` and every `timestamp` an instance writes come from here.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads `chrono::Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock stopped at a fixed instant, moved forward only by `advance`
#[cfg(test)]
pub struct FrozenClock {
    base: DateTime<Utc>,
    offset_ms: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl FrozenClock {
    pub fn at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            offset_ms: std::sync::atomic::AtomicI64::new(0),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.offset_ms
            .fetch_add(by.num_milliseconds(), std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = self.offset_ms.load(std::sync::atomic::Ordering::SeqCst);
        self.base + chrono::Duration::milliseconds(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_clock_is_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
        assert!(now <= Utc::now());
    }

    #[test]
    fn test_frozen_clock_only_moves_when_advanced() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FrozenClock::at(base);
        assert_eq!(clock.now(), clock.now());

        clock.advance(chrono::Duration::milliseconds(1500));
        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(clock.now(), base + chrono::Duration::milliseconds(3500));
    }
}
