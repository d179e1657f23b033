#![warn(missing_debug_implementations)]
#![allow(clippy::single_match)]

//! The pinboard engine. An infinite-canvas media arrangement core: nodes on an unbounded
//! plane, direct-manipulation gestures, gesture-driven alignment, a dirty-driven render
//! pipeline and a bounded undo history.

// Modules
pub mod align;
pub mod camera;
pub mod engine;
pub mod interaction;
pub mod node;
pub mod render;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod tasks;
pub mod widgetflags;

// Re-exports
pub use camera::Camera;
pub use engine::Engine;
pub use node::Node;
pub use snapshot::CanvasSnapshot;
pub use store::NodeStore;
pub use widgetflags::WidgetFlags;

// Renames
extern crate nalgebra as na;
extern crate parry2d_f64 as p2d;
