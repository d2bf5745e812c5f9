// src/timing.rs
//! Per-tick timing values and the clock that produces them.

use crate::display::DisplayId;
use crate::source::TickSample;
use std::time::{Duration, Instant};

/// Timing information handed to the frame callback on every refresh tick.
///
/// Constructed fresh per tick and passed by value.
#[derive(Debug, Clone, Copy)]
pub struct FrameTiming {
    /// The display whose refresh signal produced this tick.
    pub display: DisplayId,
    /// When the callback was invoked.
    pub now: Instant,
    /// Predicted presentation time of the frame currently being prepared.
    pub frame_out: Instant,
    /// Measured time between this tick and the previous one. On the first
    /// tick of a running span this is the display's nominal refresh period.
    pub period: Duration,
}

/// Measures the inter-tick interval and predicts the frame-out timestamp.
///
/// One clock exists per live source; retargeting to another display starts a
/// fresh clock, so measured periods never span two displays.
#[derive(Debug)]
pub struct FrameClock {
    display: DisplayId,
    nominal_period: Duration,
    last_tick: Option<Instant>,
    last_frame_out: Option<Instant>,
}

impl FrameClock {
    pub fn new(display: DisplayId, nominal_period: Duration) -> Self {
        Self {
            display,
            nominal_period,
            last_tick: None,
            last_frame_out: None,
        }
    }

    pub fn display(&self) -> DisplayId {
        self.display
    }

    /// Turn a raw tick observation into callback-facing timing.
    ///
    /// The predicted frame-out is one measured period after the tick, clamped
    /// so it never moves backwards across ticks of the same span even when a
    /// tick arrives early.
    pub fn annotate(&mut self, sample: TickSample) -> FrameTiming {
        let now = sample.timestamp;
        let period = match self.last_tick {
            Some(previous) if now > previous => now - previous,
            _ => self.nominal_period,
        };

        let mut frame_out = now + period;
        if let Some(previous_out) = self.last_frame_out {
            if frame_out < previous_out {
                frame_out = previous_out;
            }
        }

        self.last_tick = Some(now);
        self.last_frame_out = Some(frame_out);

        FrameTiming {
            display: self.display,
            now,
            frame_out,
            period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const NOMINAL: Duration = Duration::from_millis(20);

    fn clock() -> FrameClock {
        FrameClock::new(DisplayId(1), NOMINAL)
    }

    fn sample(at: Instant) -> TickSample {
        TickSample { timestamp: at }
    }

    #[test]
    fn it_should_report_the_nominal_period_on_the_first_tick() {
        let mut clock = clock();
        let base = Instant::now();
        let timing = clock.annotate(sample(base));
        assert_eq!(timing.period, NOMINAL);
        assert_eq!(timing.frame_out, base + NOMINAL);
        assert_eq!(timing.display, DisplayId(1));
    }

    #[test]
    fn it_should_measure_the_period_from_consecutive_ticks() {
        let mut clock = clock();
        let base = Instant::now();
        clock.annotate(sample(base));
        let timing = clock.annotate(sample(base + Duration::from_millis(17)));
        assert_eq!(timing.period, Duration::from_millis(17));
        assert_eq!(timing.frame_out, base + Duration::from_millis(34));
    }

    #[test]
    fn it_should_keep_frame_out_monotone_when_a_tick_arrives_early() {
        let mut clock = clock();
        let base = Instant::now();
        clock.annotate(sample(base));
        let late = clock.annotate(sample(base + Duration::from_millis(30)));
        // An early tick right after a late one would naively predict a
        // frame-out before the previous prediction.
        let early = clock.annotate(sample(base + Duration::from_millis(32)));
        assert!(early.frame_out >= late.frame_out);
        assert_eq!(early.period, Duration::from_millis(2));
    }
}
