//! Typed errors for the public API and the internal source seam.
//!
//! Plain enums with manual [`fmt::Display`] and [`std::error::Error`] impls, in
//! the teacher's manner. [`SourceError`] is the source-level error produced by
//! tick sources; it maps into the public [`LinkError`] via [`From`].

use std::error::Error;
use std::fmt;

use crate::display::{DisplayId, Point};

/// Errors surfaced by the public [`RefreshLink`](crate::RefreshLink) API.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// No display/source could be bound.
    SourceUnavailable(String),
    /// Pointer resolution found no display at the given location.
    NoDisplayAtLocation(Point),
    /// The bound display disappeared.
    DisplayLost(DisplayId),
    /// `start()` was called while already running.
    AlreadyRunning,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::SourceUnavailable(reason) => {
                write!(f, "no refresh source available: {}", reason)
            }
            LinkError::NoDisplayAtLocation(point) => {
                write!(f, "no display at location {:?}", point)
            }
            LinkError::DisplayLost(id) => write!(f, "display {} lost", id),
            LinkError::AlreadyRunning => write!(f, "link is already running"),
        }
    }
}

impl Error for LinkError {}

/// Source-level error produced while opening or waiting on a tick source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The wait was interrupted by the waker.
    Interrupted,
    /// The bound display disappeared.
    DisplayLost(DisplayId),
    /// The source failed for some other reason.
    Failed(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Interrupted => write!(f, "source wait interrupted"),
            SourceError::DisplayLost(id) => write!(f, "display {} lost", id),
            SourceError::Failed(reason) => write!(f, "source failed: {}", reason),
        }
    }
}

impl Error for SourceError {}

impl From<SourceError> for LinkError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::DisplayLost(id) => LinkError::DisplayLost(id),
            SourceError::Interrupted => {
                LinkError::SourceUnavailable("source wait interrupted".to_string())
            }
            SourceError::Failed(reason) => LinkError::SourceUnavailable(reason),
        }
    }
}
