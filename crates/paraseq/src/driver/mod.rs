mod func;
mod interface;

pub use func::*;
pub use interface::*;
