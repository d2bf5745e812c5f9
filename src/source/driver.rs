// src/source/driver.rs
//! RefreshDriver trait - minimal interface for platform refresh mechanisms.
//!
//! Implementations should be RISC-style: bind to one display and block until
//! its next vertical refresh. Everything else (lifecycle, callback storage,
//! timing annotation, retargeting) lives in
//! [`RefreshLink`](crate::link::RefreshLink).
//!
//! ## Threading Model
//! - `wait_tick` is called in a loop on the link's dedicated delivery thread
//! - The waker is called from control threads to interrupt a blocking wait
//! - A source is owned by exactly one delivery thread; it is torn down and a
//!   fresh one opened on every retarget

use crate::config::LinkConfig;
use crate::display::DisplayInfo;
use crate::error::SourceError;
use anyhow::Result;
use std::time::Instant;

/// One observed hardware refresh tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    pub timestamp: Instant,
}

/// Cross-thread handle that interrupts a source blocked in
/// [`TickSource::wait_tick`].
///
/// Platform implementations post to whatever queue the source blocks on; the
/// interrupted wait returns [`SourceError::Interrupted`].
pub trait SourceWaker: Send + Sync {
    fn wake(&self) -> Result<()>;
}

/// A live refresh-notification subscription bound to one display.
pub trait TickSource: Send {
    /// Obtain a waker for this source. Called once, before the source moves
    /// onto the delivery thread.
    fn waker(&self) -> Box<dyn SourceWaker>;

    /// Block until the display's next vertical refresh.
    ///
    /// Returns [`SourceError::Interrupted`] when woken by the waker and
    /// [`SourceError::DisplayLost`] when the bound display disappears.
    fn wait_tick(&mut self) -> Result<TickSample, SourceError>;
}

/// Factory for tick sources; the seam between the link and the platform's
/// refresh mechanism (CVDisplayLink, DRM vblank, or the built-in timer).
pub trait RefreshDriver: Send + Sync {
    /// Bind a tick source to `display`. Fails when the display cannot be
    /// attached to.
    fn open(
        &self,
        display: &DisplayInfo,
        config: &LinkConfig,
    ) -> Result<Box<dyn TickSource>, SourceError>;
}
