mod interface;
mod lock;
#[cfg(feature = "sharded")]
mod sharded;

pub use interface::*;
pub use lock::*;
#[cfg_attr(docsrs, doc(cfg(feature = "sharded")))]
#[cfg(feature = "sharded")]
pub use sharded::*;

/// The claim store used when none is chosen explicitly.
///
/// [`ShardedClaimStore`] with the `sharded` feature, [`LockClaimStore`]
/// otherwise.
#[cfg(feature = "sharded")]
pub type DefaultClaimStore<T> = ShardedClaimStore<T>;

/// The claim store used when none is chosen explicitly.
///
/// `ShardedClaimStore` with the `sharded` feature, [`LockClaimStore`]
/// otherwise.
#[cfg(not(feature = "sharded"))]
pub type DefaultClaimStore<T> = LockClaimStore<T>;
