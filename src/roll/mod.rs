//! The piano-roll editor core: renderers and interaction state machines.
//!
//! Everything here is pure, synchronous logic over pixel and cell
//! coordinates - no I/O, no widgets. A frontend feeds pointer/keyboard
//! events into the gesture state machines, applies the typed commits they
//! return to the project store (inside a history batch), and paints the
//! draw lists the renderers produce. The state machines never mutate the
//! project themselves.

/// Copy/paste/duplicate over anchor-relative note shapes.
pub mod clipboard;
/// Whole-selection move gesture with rigid-group clamping.
pub mod drag;
/// Pixel/cell geometry shared by renderers and gestures.
pub mod geometry;
/// Draw-list builder and hit-testing for the note grid.
pub mod grid_render;
/// Modifier+key to editor-command dispatch.
pub mod keyboard;
/// Draw-list builder and hit-testing for the piano keys column.
pub mod keys_render;
/// Duration-only resize gesture.
pub mod resize;
/// Rectangle selection state machine and the selection set.
pub mod selection;

pub use drag::{DragGesture, NoteCommit};
pub use geometry::GridGeometry;
pub use resize::ResizeGesture;
pub use selection::Selection;
