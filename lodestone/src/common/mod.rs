mod compare;
mod constants;
mod json;
pub mod util;
mod value;

pub use compare::*;
pub use constants::*;
pub use util::*;
pub use value::*;
