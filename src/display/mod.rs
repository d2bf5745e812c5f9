// src/display/mod.rs
//! Display model and the topology resolution seam.
//!
//! [`DisplayTopology`] abstracts the platform's screen enumeration service:
//! which displays exist, which one is primary, and which one contains a given
//! screen-space point. [`RefreshLink`](crate::link::RefreshLink) only ever
//! talks to this trait, so targeting policy is injected and testable rather
//! than read from an implicit global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// A point in global screen-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rectangle in global screen-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Whether `point` falls inside this rectangle. Right and bottom edges
    /// are exclusive so adjacent displays never both claim a point.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

/// Opaque identity of one physical display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayId(pub u32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display {}", self.0)
    }
}

/// One attached physical display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Bounds in global screen-space coordinates.
    pub bounds: Rect,
    /// Refresh rate in Hz, if the platform reports one. When `None`, the
    /// link falls back to [`LinkConfig::fallback_refresh_hz`](crate::config::LinkConfig).
    #[serde(default)]
    pub refresh_hz: Option<f64>,
    /// Platform-designated primary display.
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub name: String,
}

/// Display enumeration and resolution service.
///
/// Implementations wrap whatever the platform offers (Core Graphics display
/// lists, RandR, a compositor protocol). [`StaticTopology`] covers headless
/// and test use.
pub trait DisplayTopology: Send + Sync {
    /// Enumerate the currently attached displays.
    fn displays(&self) -> Vec<DisplayInfo>;

    /// The platform-designated primary display, falling back to the first
    /// attached display when none is marked primary.
    fn primary(&self) -> Option<DisplayInfo> {
        let displays = self.displays();
        displays
            .iter()
            .find(|d| d.is_primary)
            .cloned()
            .or_else(|| displays.first().cloned())
    }

    /// The display whose bounds contain `point`, or `None`.
    fn display_at(&self, point: Point) -> Option<DisplayInfo> {
        self.displays().into_iter().find(|d| d.bounds.contains(point))
    }

    /// Look a display up by identity. Used by running sources to notice that
    /// their display has been unplugged.
    fn display_by_id(&self, id: DisplayId) -> Option<DisplayInfo> {
        self.displays().into_iter().find(|d| d.id == id)
    }
}

/// Fixed-list topology for headless operation and tests.
///
/// The list is behind a mutex so tests can attach and detach displays while a
/// link is running.
pub struct StaticTopology {
    displays: Mutex<Vec<DisplayInfo>>,
}

impl StaticTopology {
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self {
            displays: Mutex::new(displays),
        }
    }

    /// Replace the attached-display list.
    pub fn set_displays(&self, displays: Vec<DisplayInfo>) {
        *self.displays.lock().unwrap() = displays;
    }

    /// Detach one display, as if it were unplugged.
    pub fn remove_display(&self, id: DisplayId) {
        self.displays.lock().unwrap().retain(|d| d.id != id);
    }
}

impl DisplayTopology for StaticTopology {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.displays.lock().unwrap().clone()
    }
}
