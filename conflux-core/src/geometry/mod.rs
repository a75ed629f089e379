//! Polygon screening and boundary-direction classification.

pub mod direction;
pub mod filter;

pub use direction::{boundary_directions, classify_cut, Direction, Directions, FLAG_COLUMNS};
pub use filter::SpatialFilter;
