// src/source/manual.rs
//! Test-controlled refresh source.
//!
//! Ticks are injected by the test over a channel, so delivery is fully
//! deterministic: the test decides when a "hardware" refresh happens and with
//! which timestamp, and can simulate a display vanishing mid-run.

use crate::config::LinkConfig;
use crate::display::{DisplayId, DisplayInfo};
use crate::error::SourceError;
use crate::source::driver::{RefreshDriver, SourceWaker, TickSample, TickSource};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
enum ManualEvent {
    Tick(Instant),
    Lost,
    Wake,
}

/// Driver whose sources tick only when the test says so.
///
/// Each `open` replaces the driver's send handle for that display, so
/// injected events always reach the most recently opened source. Injection
/// into a torn-down source reports `false` rather than delivering anywhere.
pub struct ManualDriver {
    senders: Mutex<HashMap<DisplayId, Sender<ManualEvent>>>,
    opened: Mutex<Vec<DisplayId>>,
}

impl ManualDriver {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Inject one tick with an explicit timestamp. Returns whether a live
    /// source accepted it.
    pub fn tick_at(&self, display: DisplayId, timestamp: Instant) -> bool {
        self.send(display, ManualEvent::Tick(timestamp))
    }

    /// Inject one tick stamped with the current time.
    pub fn tick(&self, display: DisplayId) -> bool {
        self.tick_at(display, Instant::now())
    }

    /// Make the source for `display` report that its display disappeared.
    pub fn lose_display(&self, display: DisplayId) -> bool {
        self.send(display, ManualEvent::Lost)
    }

    /// Every display an `open` was issued for, in order.
    pub fn opened(&self) -> Vec<DisplayId> {
        self.opened.lock().unwrap().clone()
    }

    fn send(&self, display: DisplayId, event: ManualEvent) -> bool {
        let senders = self.senders.lock().unwrap();
        match senders.get(&display) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

impl Default for ManualDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshDriver for ManualDriver {
    fn open(
        &self,
        display: &DisplayInfo,
        _config: &LinkConfig,
    ) -> Result<Box<dyn TickSource>, SourceError> {
        let (tx, rx) = channel();
        self.senders.lock().unwrap().insert(display.id, tx.clone());
        self.opened.lock().unwrap().push(display.id);
        Ok(Box::new(ManualTickSource {
            display: display.id,
            tx,
            rx,
        }))
    }
}

struct ManualTickSource {
    display: DisplayId,
    tx: Sender<ManualEvent>,
    rx: Receiver<ManualEvent>,
}

impl TickSource for ManualTickSource {
    fn waker(&self) -> Box<dyn SourceWaker> {
        Box::new(ManualWaker {
            tx: self.tx.clone(),
        })
    }

    fn wait_tick(&mut self) -> Result<TickSample, SourceError> {
        match self.rx.recv() {
            Ok(ManualEvent::Tick(timestamp)) => Ok(TickSample { timestamp }),
            Ok(ManualEvent::Lost) => Err(SourceError::DisplayLost(self.display)),
            Ok(ManualEvent::Wake) | Err(_) => Err(SourceError::Interrupted),
        }
    }
}

struct ManualWaker {
    tx: Sender<ManualEvent>,
}

impl SourceWaker for ManualWaker {
    fn wake(&self) -> Result<()> {
        self.tx
            .send(ManualEvent::Wake)
            .map_err(|_| anyhow!("manual source already torn down"))
    }
}
