mod key_utils;
mod atomic;

pub use key_utils::*;
pub use atomic::*;
