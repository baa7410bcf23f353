//! Geometry shared by the strata layout crates
//!
//! Points, inclusive rectangles, index spaces and coordinate transforms over integer coordinates.

mod coord;
mod index_space;
mod matrix;
mod point;
mod rect;

pub use coord::*;
pub use index_space::*;
pub use matrix::*;
pub use point::*;
pub use rect::*;
