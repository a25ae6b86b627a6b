use std::time::{Duration, Instant};

/// Fixed-rate pacing for the render loop.
///
/// Deadlines advance by one period per frame. When the loop falls more than a
/// whole period behind, the clock resynchronises to "now" instead of firing a
/// burst of catch-up frames.
#[derive(Debug, Clone)]
pub struct RenderClock {
    period: Duration,
    started: Instant,
    next_deadline: Instant,
    frame: u64,
}

/// One scheduled render iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub index: u64,
    pub elapsed: Duration,
}

impl RenderClock {
    pub fn new(fps: u32) -> Self {
        Self::starting_at(fps, Instant::now())
    }

    pub fn starting_at(fps: u32, now: Instant) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        Self {
            period,
            started: now,
            next_deadline: now,
            frame: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// How long to wait from `now` before the next frame is due.
    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next_deadline.saturating_duration_since(now)
    }

    /// Marks a frame as rendered at `now` and schedules the next one.
    pub fn advance(&mut self, now: Instant) -> FrameTick {
        let tick = FrameTick {
            index: self.frame,
            elapsed: now.saturating_duration_since(self.started),
        };

        self.frame += 1;
        self.next_deadline += self.period;
        if now.saturating_duration_since(self.next_deadline) > self.period {
            tracing::trace!(frame = tick.index, "render loop fell behind, resynchronising");
            self.next_deadline = now + self.period;
        }

        tick
    }

    /// Sleeps until the next frame is due, then advances.
    pub fn wait(&mut self) -> FrameTick {
        let delay = self.time_until_next(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.advance(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_due_immediately() {
        let now = Instant::now();
        let clock = RenderClock::starting_at(60, now);
        assert_eq!(clock.time_until_next(now), Duration::ZERO);
    }

    #[test]
    fn deadlines_advance_by_one_period() {
        let start = Instant::now();
        let mut clock = RenderClock::starting_at(50, start);
        assert_eq!(clock.period(), Duration::from_millis(20));

        let tick = clock.advance(start);
        assert_eq!(tick.index, 0);
        assert_eq!(clock.time_until_next(start), Duration::from_millis(20));

        let tick = clock.advance(start + Duration::from_millis(20));
        assert_eq!(tick.index, 1);
        assert_eq!(tick.elapsed, Duration::from_millis(20));
        assert_eq!(
            clock.time_until_next(start + Duration::from_millis(25)),
            Duration::from_millis(15)
        );
    }

    #[test]
    fn resynchronises_after_a_stall() {
        let start = Instant::now();
        let mut clock = RenderClock::starting_at(50, start);
        clock.advance(start);

        let late = start + Duration::from_millis(500);
        clock.advance(late);

        assert_eq!(clock.time_until_next(late), Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_sequential_ticks() {
        let mut clock = RenderClock::new(1000);
        let first = clock.wait();
        let second = clock.wait();
        assert_eq!(second.index, first.index + 1);
        assert!(second.elapsed >= first.elapsed);
    }
}
