#![cfg_attr(docsrs, feature(doc_cfg))]

mod driver;
mod enumerator;
mod error;
mod mutex;
mod observe;
mod state;
mod store;
mod token;
mod traverse;

pub use crate::driver::*;
pub use crate::enumerator::*;
pub use crate::error::*;
pub use crate::observe::*;
pub use crate::state::EngineState;
pub use crate::store::*;
pub use crate::token::*;
pub use crate::traverse::*;
pub use tokio_util::sync::CancellationToken;
