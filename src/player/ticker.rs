use std::time::{Duration, Instant};

/// Ticks fired at most per `due` call; anything further behind is dropped.
pub const MAX_CATCH_UP: u32 = 50;

/// Shortest period a ticker accepts.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Fixed-period deadline clock.
///
/// A ticker is the playback timer handle: the running state owns exactly one,
/// and dropping it is cancellation. It is not `Clone`.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next_due: Instant,
}

impl Ticker {
    pub fn start(period: Duration, now: Instant) -> Self {
        let period = period.max(MIN_PERIOD);
        Ticker {
            period,
            next_due: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Number of whole periods that have elapsed by `now`, advancing the
    /// deadline past them. After a stall longer than `MAX_CATCH_UP` periods
    /// the backlog is dropped and the clock restarts from `now`.
    pub fn due(&mut self, now: Instant) -> u32 {
        if now < self.next_due {
            return 0;
        }
        let behind = now.duration_since(self.next_due).as_nanos() / self.period.as_nanos();
        let missed = behind.saturating_add(1);
        if missed > u128::from(MAX_CATCH_UP) {
            self.next_due = now + self.period;
            return MAX_CATCH_UP;
        }
        // missed <= MAX_CATCH_UP, so both conversions are lossless
        self.next_due += self.period * missed as u32;
        missed as u32
    }
}
