mod event;
mod observable;
mod registry;
#[cfg(test)]
mod tests;

pub use event::*;
pub use observable::*;
pub use registry::*;
