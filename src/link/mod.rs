// src/link/mod.rs
//! RefreshLink - display-synchronized callback scheduling.
//!
//! A [`RefreshLink`] binds to one physical display's vertical-refresh signal
//! and invokes a caller-supplied callback once per refresh interval on a
//! dedicated delivery thread, handing it a fresh [`FrameTiming`] each tick.
//! The link can be retargeted to another display at runtime without losing
//! the callback.
//!
//! ## Threading Model
//! - Control calls (`start`, `stop`, retargets) may come from any thread and
//!   serialize on an internal mutex
//! - Ticks fire on one dedicated delivery thread per running span; the
//!   callback executes there and must return promptly
//! - `is_running` is a lock-free atomic read
//!
//! ## Lifecycle
//! Stopped → `start` → Running → `stop` → Stopped, restartable any number of
//! times. Dropping a running link stops it first, so the delivery thread can
//! never outlive the link's callback.

use crate::config::LinkConfig;
use crate::display::{DisplayId, DisplayInfo, DisplayTopology};
use crate::error::{LinkError, SourceError};
use crate::input::PointerSnapshot;
use crate::source::{RefreshDriver, SourceWaker, TickSource, TimerDriver};
use crate::timing::{FrameClock, FrameTiming};
use anyhow::Context;
use log::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

#[cfg(test)]
mod tests;

/// The frame callback. Invoked synchronously on the delivery thread once per
/// refresh tick while the link is running.
pub type FrameCallback = Box<dyn FnMut(FrameTiming) + Send + 'static>;

/// State shared between control threads and the delivery thread.
struct LinkShared {
    /// True between a successful `start` and the next `stop` or failure.
    running: AtomicBool,
    /// Bumped on every teardown. A delivery thread whose spawn-time epoch no
    /// longer matches must not deliver, even if `running` flips true again
    /// for a successor source.
    epoch: AtomicU64,
    /// The callback slot. Locked for the duration of one invocation, so a
    /// teardown that has joined the delivery thread can clear it knowing no
    /// invocation is in flight.
    callback: Mutex<Option<FrameCallback>>,
    /// Identity of the current delivery thread, for re-entrant control calls
    /// made from inside the callback.
    delivery_thread: Mutex<Option<ThreadId>>,
}

/// Handle to the live source: everything a teardown needs.
struct SourceHandle {
    display: DisplayInfo,
    waker: Box<dyn SourceWaker>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

struct ControlState {
    /// Display that will drive the next (or current) running span.
    target: Option<DisplayInfo>,
    /// Live source while running.
    source: Option<SourceHandle>,
}

/// A lifecycle-managed wrapper around a display refresh-notification source.
///
/// Constructed stopped, with no callback and no display binding. `start`
/// binds a callback and (if no retarget chose one) the primary display;
/// `stop` halts delivery and releases the source. Safe to share behind an
/// `Arc` and drive from any thread.
pub struct RefreshLink {
    shared: Arc<LinkShared>,
    topology: Arc<dyn DisplayTopology>,
    driver: Arc<dyn RefreshDriver>,
    config: LinkConfig,
    control: Mutex<ControlState>,
}

impl RefreshLink {
    /// Create a link over an explicit driver. The common entry point for
    /// tests and for platforms with a native refresh mechanism.
    pub fn new(
        topology: Arc<dyn DisplayTopology>,
        driver: Arc<dyn RefreshDriver>,
        config: LinkConfig,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                callback: Mutex::new(None),
                delivery_thread: Mutex::new(None),
            }),
            topology,
            driver,
            config,
            control: Mutex::new(ControlState {
                target: None,
                source: None,
            }),
        }
    }

    /// Create a link driven by the built-in software timer.
    pub fn with_timer(topology: Arc<dyn DisplayTopology>, config: LinkConfig) -> Self {
        let driver = Arc::new(TimerDriver::new(topology.clone()));
        Self::new(topology, driver, config)
    }

    /// Begin delivering ticks to `callback`.
    ///
    /// Valid only while stopped; returns [`LinkError::AlreadyRunning`]
    /// otherwise. Binds to the display chosen by an earlier retarget, or the
    /// topology's primary display. Fails with [`LinkError::SourceUnavailable`]
    /// when no display can be bound, leaving the link stopped.
    pub fn start<F>(&self, callback: F) -> Result<(), LinkError>
    where
        F: FnMut(FrameTiming) + Send + 'static,
    {
        let mut control = self.lock_control()?;

        if self.shared.running.load(Ordering::SeqCst) {
            return Err(LinkError::AlreadyRunning);
        }

        // A stale handle can linger after a stop issued from inside the
        // callback or after a display was lost; its thread is exiting on its
        // own and can no longer deliver (stale epoch), so just drop it.
        if let Some(handle) = control.source.take() {
            debug!("discarding exited source for {}", handle.display.id);
        }

        let display = match control.target.clone() {
            Some(display) => display,
            None => self
                .topology
                .primary()
                .ok_or_else(|| LinkError::SourceUnavailable("no displays attached".to_string()))?,
        };

        let source = self
            .driver
            .open(&display, &self.config)
            .map_err(|e| LinkError::SourceUnavailable(e.to_string()))?;

        // This blocks if a previous delivery thread is still inside its final
        // callback invocation; the new callback is only in place once that
        // invocation has returned.
        *self.shared.callback.lock().unwrap() = Some(Box::new(callback));
        self.shared.running.store(true, Ordering::SeqCst);

        match self.spawn_delivery(source, &display) {
            Ok(handle) => {
                info!("linked to {} ({})", display.id, display.name);
                control.target = Some(display);
                control.source = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                *self.shared.callback.lock().unwrap() = None;
                Err(LinkError::SourceUnavailable(format!("{:#}", e)))
            }
        }
    }

    /// Halt delivery and release the underlying source. Idempotent.
    ///
    /// After `stop` returns, no callback invocation can begin until the next
    /// `start`; if a tick is in flight on the delivery thread, `stop` blocks
    /// until that invocation completes. The one exception is calling `stop`
    /// from inside the callback itself: the call returns immediately and
    /// delivery ends when the callback does.
    pub fn stop(&self) {
        if self.on_delivery_thread() {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            debug!("stop() from the delivery thread; delivery ends when the callback returns");
            return;
        }

        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self.control.lock().unwrap().source.take();
        if let Some(mut handle) = handle {
            self.teardown(&mut handle);
            info!("unlinked from {}", handle.display.id);
        }
        // The join above guarantees no invocation is in flight.
        *self.shared.callback.lock().unwrap() = None;
    }

    /// Whether the link is currently delivering ticks. Safe from any thread.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The display currently driving (or selected to drive) this link.
    pub fn linked_display(&self) -> Option<DisplayId> {
        let control = self.control.lock().unwrap();
        control
            .source
            .as_ref()
            .map(|handle| handle.display.id)
            .or_else(|| control.target.as_ref().map(|display| display.id))
    }

    /// Retarget to the platform-designated primary display.
    ///
    /// Legal in both states. While running, the old source is torn down
    /// completely before the new one goes live; ticks are delivered from
    /// exactly one source at any instant, at the cost of up to one missed
    /// period across the swap.
    pub fn link_to_primary(&self) -> Result<(), LinkError> {
        let display = self
            .topology
            .primary()
            .ok_or_else(|| LinkError::SourceUnavailable("no displays attached".to_string()))?;
        self.retarget(display)
    }

    /// Retarget to the display under the pointer location captured in
    /// `snapshot`.
    ///
    /// Returns [`LinkError::NoDisplayAtLocation`] when the pointer is outside
    /// every known display; the existing binding is left untouched.
    pub fn link_to_display_under_pointer(
        &self,
        snapshot: &PointerSnapshot,
    ) -> Result<(), LinkError> {
        let location = snapshot.location();
        let display = self
            .topology
            .display_at(location)
            .ok_or(LinkError::NoDisplayAtLocation(location))?;
        self.retarget(display)
    }

    fn retarget(&self, display: DisplayInfo) -> Result<(), LinkError> {
        let mut control = self.lock_control()?;

        if !self.shared.running.load(Ordering::SeqCst) {
            debug!("{} will drive the next start", display.id);
            control.target = Some(display);
            return Ok(());
        }

        if let Some(handle) = control.source.as_ref() {
            if handle.display.id == display.id {
                trace!("already linked to {}", display.id);
                control.target = Some(display);
                return Ok(());
            }
        }

        // Old source down first; one source delivers at any instant.
        if let Some(mut handle) = control.source.take() {
            self.teardown(&mut handle);
            debug!("tore down source for {}", handle.display.id);
        }

        // If the new display cannot be bound the old binding is already gone,
        // so the link stops rather than limping on without a source.
        let source = self.driver.open(&display, &self.config).map_err(|e| {
            self.shared.running.store(false, Ordering::SeqCst);
            LinkError::SourceUnavailable(e.to_string())
        })?;

        match self.spawn_delivery(source, &display) {
            Ok(handle) => {
                info!("relinked to {} ({})", display.id, display.name);
                control.target = Some(display);
                control.source = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(LinkError::SourceUnavailable(format!("{:#}", e)))
            }
        }
    }

    /// Spawn the delivery thread for an opened source.
    fn spawn_delivery(
        &self,
        source: Box<dyn TickSource>,
        display: &DisplayInfo,
    ) -> anyhow::Result<SourceHandle> {
        let waker = source.waker();
        let shared = self.shared.clone();
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let nominal_period = self.config.nominal_period(display);
        let budget = self.config.callback_budget(nominal_period);
        let clock = FrameClock::new(display.id, nominal_period);

        let thread = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || delivery_loop(shared, source, clock, budget, epoch))
            .context("failed to spawn delivery thread")?;
        let thread_id = thread.thread().id();
        *self.shared.delivery_thread.lock().unwrap() = Some(thread_id);

        Ok(SourceHandle {
            display: display.clone(),
            waker,
            thread: Some(thread),
            thread_id,
        })
    }

    /// Invalidate and dismantle a source handle. Joins the delivery thread
    /// unless called on it.
    fn teardown(&self, handle: &mut SourceHandle) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = handle.waker.wake() {
            // Source already gone; the thread has exited or is exiting.
            debug!("waking {}: {:#}", handle.display.id, e);
        }
        if thread::current().id() == handle.thread_id {
            debug!("teardown from the delivery thread; skipping self-join");
            return;
        }
        if let Some(thread) = handle.thread.take() {
            if thread.join().is_err() {
                error!("delivery thread for {} panicked", handle.display.id);
            }
        }
        *self.shared.delivery_thread.lock().unwrap() = None;
    }

    fn on_delivery_thread(&self) -> bool {
        *self.shared.delivery_thread.lock().unwrap() == Some(thread::current().id())
    }

    /// Acquire the control mutex. On the delivery thread the acquire must not
    /// block: a control thread could be holding the mutex while joining this
    /// very thread.
    fn lock_control(&self) -> Result<MutexGuard<'_, ControlState>, LinkError> {
        if self.on_delivery_thread() {
            return self.control.try_lock().map_err(|_| {
                LinkError::SourceUnavailable(
                    "another control call is in progress; retarget from the frame callback \
                     cannot wait for it"
                        .to_string(),
                )
            });
        }
        Ok(self.control.lock().unwrap())
    }
}

impl Drop for RefreshLink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn live(shared: &LinkShared, epoch: u64) -> bool {
    shared.epoch.load(Ordering::SeqCst) == epoch && shared.running.load(Ordering::SeqCst)
}

/// The delivery thread: wait for a tick, annotate it, invoke the callback.
fn delivery_loop(
    shared: Arc<LinkShared>,
    mut source: Box<dyn TickSource>,
    mut clock: FrameClock,
    budget: Duration,
    epoch: u64,
) {
    let display = clock.display();
    debug!("delivery started for {}", display);

    let mut window_start = Instant::now();
    let mut window_ticks: u64 = 0;

    enum TickOutcome {
        Delivered(Duration),
        Panicked,
        Halt,
    }

    loop {
        let sample = match source.wait_tick() {
            Ok(sample) => sample,
            Err(SourceError::Interrupted) => break,
            Err(SourceError::DisplayLost(id)) => {
                warn!("{} lost while linked; halting delivery", id);
                if shared.epoch.load(Ordering::SeqCst) == epoch {
                    shared.running.store(false, Ordering::SeqCst);
                }
                break;
            }
            Err(SourceError::Failed(reason)) => {
                warn!("source for {} failed: {}; halting delivery", display, reason);
                if shared.epoch.load(Ordering::SeqCst) == epoch {
                    shared.running.store(false, Ordering::SeqCst);
                }
                break;
            }
        };

        if !live(&shared, epoch) {
            break;
        }

        let timing = clock.annotate(sample);
        trace!(
            "{}: tick at {:?}, frame out {:?}, period {:?}",
            display,
            timing.now,
            timing.frame_out,
            timing.period
        );

        let outcome = {
            let mut slot = shared.callback.lock().unwrap();
            // Re-checked under the lock: a teardown that begins after the
            // wait returned must not see one more invocation start.
            if !live(&shared, epoch) {
                TickOutcome::Halt
            } else if let Some(callback) = slot.as_mut() {
                let started = Instant::now();
                match catch_unwind(AssertUnwindSafe(|| callback(timing))) {
                    Ok(()) => TickOutcome::Delivered(started.elapsed()),
                    Err(_) => TickOutcome::Panicked,
                }
            } else {
                TickOutcome::Halt
            }
        };

        match outcome {
            TickOutcome::Delivered(took) => {
                if took > budget {
                    warn!(
                        "frame callback ran {:?}, over its {:?} budget; \
                         long callbacks delay every subsequent tick",
                        took, budget
                    );
                }
                window_ticks += 1;
                let window = window_start.elapsed();
                if window >= Duration::from_secs(1) {
                    debug!(
                        "{}: delivered {} ticks in the last {:?}",
                        display, window_ticks, window
                    );
                    window_start = Instant::now();
                    window_ticks = 0;
                }
            }
            TickOutcome::Panicked => {
                error!("frame callback panicked; halting delivery for {}", display);
                if shared.epoch.load(Ordering::SeqCst) == epoch {
                    shared.running.store(false, Ordering::SeqCst);
                }
                break;
            }
            TickOutcome::Halt => break,
        }

        if !live(&shared, epoch) {
            break;
        }
    }

    debug!("delivery ended for {}", display);
}
