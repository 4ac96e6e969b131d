mod interface;
mod metadata;
mod parallel;

pub use interface::*;
pub use metadata::*;
pub use parallel::*;
