// src/source/timer.rs
//! Software timer source that ticks at the display's refresh rate.
//!
//! Stands in for platform-specific vsync APIs (CVDisplayLink on macOS, DRM
//! vblank ioctls on Linux, DwmFlush on Windows) on platforms where none is
//! wired up. Deadlines advance on the ideal grid, so timer jitter does not
//! accumulate into drift; a whole period is skipped when the thread oversleeps.

use crate::config::LinkConfig;
use crate::display::{DisplayId, DisplayInfo, DisplayTopology};
use crate::error::SourceError;
use crate::source::driver::{RefreshDriver, SourceWaker, TickSample, TickSource};
use anyhow::{anyhow, Result};
use log::trace;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Driver producing [`TimerTickSource`]s.
///
/// Holds the topology so each source can notice when its display is
/// unplugged mid-run.
pub struct TimerDriver {
    topology: Arc<dyn DisplayTopology>,
}

impl TimerDriver {
    pub fn new(topology: Arc<dyn DisplayTopology>) -> Self {
        Self { topology }
    }
}

impl RefreshDriver for TimerDriver {
    fn open(
        &self,
        display: &DisplayInfo,
        config: &LinkConfig,
    ) -> Result<Box<dyn TickSource>, SourceError> {
        if self.topology.display_by_id(display.id).is_none() {
            return Err(SourceError::Failed(format!("{} is not attached", display.id)));
        }
        Ok(Box::new(TimerTickSource::new(
            display.id,
            config.nominal_period(display),
            self.topology.clone(),
        )))
    }
}

/// Absolute-deadline timer bound to one display's nominal refresh period.
pub struct TimerTickSource {
    display: DisplayId,
    period: Duration,
    topology: Arc<dyn DisplayTopology>,
    next_deadline: Instant,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl TimerTickSource {
    fn new(display: DisplayId, period: Duration, topology: Arc<dyn DisplayTopology>) -> Self {
        let (wake_tx, wake_rx) = channel();
        Self {
            display,
            period,
            topology,
            next_deadline: Instant::now() + period,
            wake_tx,
            wake_rx,
        }
    }
}

impl TickSource for TimerTickSource {
    fn waker(&self) -> Box<dyn SourceWaker> {
        Box::new(TimerWaker {
            tx: self.wake_tx.clone(),
        })
    }

    fn wait_tick(&mut self) -> Result<TickSample, SourceError> {
        loop {
            let now = Instant::now();
            if now >= self.next_deadline {
                break;
            }
            // The wake channel doubles as the sleep: a message arriving
            // before the deadline is an interrupt, a timeout is the tick.
            match self.wake_rx.recv_timeout(self.next_deadline - now) {
                Ok(()) => return Err(SourceError::Interrupted),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(SourceError::Interrupted),
            }
        }

        let timestamp = Instant::now();
        self.next_deadline += self.period;
        while self.next_deadline <= timestamp {
            trace!("{}: overslept a refresh period, realigning", self.display);
            self.next_deadline += self.period;
        }

        if self.topology.display_by_id(self.display).is_none() {
            return Err(SourceError::DisplayLost(self.display));
        }

        Ok(TickSample { timestamp })
    }
}

struct TimerWaker {
    tx: Sender<()>,
}

impl SourceWaker for TimerWaker {
    fn wake(&self) -> Result<()> {
        self.tx
            .send(())
            .map_err(|_| anyhow!("timer source already torn down"))
    }
}
