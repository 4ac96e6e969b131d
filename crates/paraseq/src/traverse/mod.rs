mod ext;
#[cfg(any(feature = "async-tokio", feature = "async-smol"))]
mod runtime;

pub use ext::*;
#[cfg_attr(docsrs, doc(cfg(any(feature = "async-tokio", feature = "async-smol"))))]
#[cfg(any(feature = "async-tokio", feature = "async-smol"))]
pub use runtime::*;
