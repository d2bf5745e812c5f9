// src/input.rs
//! Captured pointer state from a platform input event.

use crate::display::Point;
use std::time::Instant;

/// A snapshot of the pointer location taken from a platform input event.
///
/// The embedding platform layer constructs one of these from whatever its
/// native event type is (a `CGEventRef`, an XI2 motion event, a Wayland
/// pointer frame); the link only ever reads the location back out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSnapshot {
    location: Point,
    captured_at: Instant,
}

impl PointerSnapshot {
    pub fn new(location: Point) -> Self {
        Self {
            location,
            captured_at: Instant::now(),
        }
    }

    /// Shorthand for building a snapshot from raw coordinates.
    pub fn at(x: f64, y: f64) -> Self {
        Self::new(Point::new(x, y))
    }

    /// The pointer location in global screen-space coordinates.
    pub fn location(&self) -> Point {
        self.location
    }

    /// When this snapshot was captured.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}
