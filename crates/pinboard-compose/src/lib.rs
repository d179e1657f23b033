#![warn(missing_debug_implementations)]
#![allow(clippy::single_match)]

//! the pinboard-compose crate provides pinboard with building blocks for geometry,
//! hit-testing, input events and spring animation.

// Modules
/// Event result.
pub mod eventresult;
/// module for extension traits for foreign types
pub mod ext;
/// module for hit-testing primitives
pub mod hittest;
/// module for input events
pub mod inputevent;
/// module for the spring integrator
pub mod spring;

// Re-exports
pub use eventresult::EventResult;
pub use inputevent::InputEvent;
pub use spring::Spring2d;
pub use spring::SpringParams;

// Renames
extern crate nalgebra as na;
extern crate parry2d_f64 as p2d;
