//! refresh-link - display-synchronized callback scheduling.
//!
//! A [`RefreshLink`] attaches to a physical display's vertical-refresh signal
//! and invokes a caller-supplied callback once per refresh interval on a
//! dedicated delivery thread, handing it precise timing for the current and
//! next frame. Links can be retargeted between displays at runtime, either
//! explicitly to the primary display or to whichever display currently
//! contains the pointer.
//!
//! ```no_run
//! use refresh_link::{LinkConfig, RefreshLink, StaticTopology};
//! use refresh_link::{DisplayId, DisplayInfo, Rect};
//! use std::sync::Arc;
//!
//! let topology = Arc::new(StaticTopology::new(vec![DisplayInfo {
//!     id: DisplayId(1),
//!     bounds: Rect { x: 0.0, y: 0.0, width: 1920.0, height: 1080.0 },
//!     refresh_hz: Some(60.0),
//!     is_primary: true,
//!     name: "built-in".to_string(),
//! }]));
//!
//! let link = RefreshLink::with_timer(topology, LinkConfig::default());
//! link.start(|timing| {
//!     // Runs on the delivery thread once per refresh; return promptly.
//!     let _frame_budget = timing.frame_out - timing.now;
//! })?;
//! assert!(link.is_running());
//! link.stop();
//! # Ok::<(), refresh_link::LinkError>(())
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod input;
pub mod link;
pub mod source;
pub mod timing;

pub use config::LinkConfig;
pub use display::{DisplayId, DisplayInfo, DisplayTopology, Point, Rect, StaticTopology};
pub use error::{LinkError, SourceError};
pub use input::PointerSnapshot;
pub use link::{FrameCallback, RefreshLink};
pub use source::{ManualDriver, RefreshDriver, SourceWaker, TickSample, TickSource, TimerDriver};
pub use timing::{FrameClock, FrameTiming};
