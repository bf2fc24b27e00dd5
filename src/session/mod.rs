//! # Editing Sessions
//!
//! A session is the working copy of one composition: ordered parts, their
//! media references and the render options. Parts are regenerated
//! independently; finalize runs read a snapshot.

pub mod editor;
pub mod store;
pub mod types;

pub use editor::{PartFailure, SessionEditor, SynthesisReport, SynthesisScope};
pub use store::{FinalizeGuard, PartLease, SessionStore};
pub use types::{
    AspectRatio, EditingSession, PartDraft, PrepareOptions, RenderOptions, ScriptInput, SessionLayout,
};
