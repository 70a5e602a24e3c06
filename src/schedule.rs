//! Fixed-period scheduling over an injectable clock

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `spin_sleep` for sub-millisecond accuracy
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Fixed-period task ticker.
///
/// The first [`tick`](Self::tick) returns at once and anchors the schedule.
/// Each later tick sleeps only the time left until the next boundary, so work
/// done between ticks does not shift the schedule. Falling more than one
/// period behind re-anchors at the current time instead of bursting.
pub struct FixedPeriod<C: Clock> {
    clock: C,
    period: Duration,
    anchor: Option<Instant>,
    overruns: u64,
}

impl<C: Clock> FixedPeriod<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        Self {
            clock,
            period,
            anchor: None,
            overruns: 0,
        }
    }

    /// Period derived from a rate, never slower than 1 Hz
    pub fn from_rate_hz(clock: C, rate_hz: f64) -> Self {
        let rate = if rate_hz.is_finite() { rate_hz.max(1.0) } else { 1.0 };
        Self::new(clock, Duration::from_secs_f64(1.0 / rate))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks that found the schedule more than a period late
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn tick(&mut self) {
        let now = self.clock.now();
        let Some(anchor) = self.anchor else {
            self.anchor = Some(now);
            return;
        };

        let deadline = anchor + self.period;
        if now < deadline {
            self.clock.sleep(deadline - now);
            self.anchor = Some(deadline);
        } else if now - deadline > self.period {
            self.overruns += 1;
            log::trace!("tick overran by {:?}, re-anchoring", now - deadline);
            self.anchor = Some(now);
        } else {
            self.anchor = Some(deadline);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_first_tick_is_immediate() {
        let clock = ManualClock::new();
        let mut ticker = FixedPeriod::new(clock.clone(), 20 * MS);
        ticker.tick();
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_sleeps_only_residual() {
        let clock = ManualClock::new();
        let mut ticker = FixedPeriod::new(clock.clone(), 20 * MS);
        ticker.tick();
        clock.advance(5 * MS);
        ticker.tick();
        clock.advance(12 * MS);
        ticker.tick();
        assert_eq!(clock.sleeps(), vec![15 * MS, 8 * MS]);
        assert_eq!(clock.elapsed(), 40 * MS);
    }

    #[test]
    fn test_late_tick_catches_up_without_sleep() {
        let clock = ManualClock::new();
        let mut ticker = FixedPeriod::new(clock.clone(), 20 * MS);
        ticker.tick();
        clock.advance(30 * MS);
        ticker.tick();
        //back on the original grid at 40ms
        clock.advance(2 * MS);
        ticker.tick();
        assert_eq!(clock.sleeps(), vec![8 * MS]);
        assert_eq!(ticker.overruns(), 0);
    }

    #[test]
    fn test_drift_bounded_to_one_period() {
        let clock = ManualClock::new();
        let mut ticker = FixedPeriod::new(clock.clone(), 20 * MS);
        ticker.tick();
        clock.advance(100 * MS);
        ticker.tick();
        assert_eq!(ticker.overruns(), 1);
        clock.advance(1 * MS);
        ticker.tick();
        assert_eq!(clock.sleeps(), vec![19 * MS]);
    }

    #[test]
    fn test_rate_floor() {
        let ticker = FixedPeriod::from_rate_hz(SystemClock, 0.0);
        assert_eq!(ticker.period(), Duration::from_secs(1));
        let ticker = FixedPeriod::from_rate_hz(SystemClock, 50.0);
        assert_eq!(ticker.period(), 20 * MS);
    }
}
