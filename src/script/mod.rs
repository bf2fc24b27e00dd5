//! # Script Parsing
//!
//! Turns raw narration text into ordered [`Part`]s, one per script section.
//!
//! ```rust
//! use narration_compositor::script::parse;
//!
//! let parts = parse("## PART 1\n**Dialogue:** Hello\n**Visual:** sunrise");
//! assert_eq!(parts[0].speech_text, "Hello");
//! assert_eq!(parts[0].image_description, "sunrise");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse, ScriptParser};
pub use types::{MediaRef, Part};
