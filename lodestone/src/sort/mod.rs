//! Sort specifications and the compiled [Sorter].
mod sort_order;
mod sorter;

pub use sort_order::*;
pub use sorter::{DistanceMap, Sorter};
