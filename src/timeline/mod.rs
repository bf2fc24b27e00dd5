//! # Timeline Model
//!
//! Clips grouped into derived tracks, with a duration that always tracks the
//! clip extents and a single placement rule shared by programmatic appends and
//! interactive drags: clips on the same track never overlap.
//!
//! ```rust
//! use narration_compositor::timeline::{Clip, ClipKind, Timeline};
//!
//! let mut timeline = Timeline::new(30.0);
//! timeline.place(Clip::new(ClipKind::PrimaryVisual, "a.png", "A", 5.0), 0.0).unwrap();
//! let start = timeline
//!     .place(Clip::new(ClipKind::PrimaryVisual, "b.png", "B", 4.0), 3.0)
//!     .unwrap();
//! assert_eq!(start, 5.0);
//! assert_eq!(timeline.duration(), 9.0);
//! ```

pub mod model;
pub mod placement;
pub mod types;

pub use model::{compute_duration, Timeline, TimelineState};
pub use placement::{resolve_start, Interval};
pub use types::{Clip, ClipKind, Track, TrackType};
