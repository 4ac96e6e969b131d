use crate::Token;

/// A concurrent map from a [`Token`] to the item it claims.
///
/// Entries are written once, when the fetch that produced the item completes,
/// and removed once, when the token is redeemed or the pass is terminated.
/// Nothing ever mutates an entry in place.
///
/// Implementations must be safe under any number of concurrent callers. A
/// store that serializes unrelated tokens behind one lock (see
/// [`LockClaimStore`]) is correct but slower than a sharded one (see
/// `ShardedClaimStore`).
///
/// [`LockClaimStore`]: crate::LockClaimStore
pub trait ClaimStore<T> {
    /// Inserts `item` under `token` if the token is absent.
    ///
    /// Returns `false`, and drops `item`, if the token already maps to a
    /// value. Tokens are minted uniquely, so the enumerator treats that as an
    /// internal-consistency failure.
    fn insert(&self, token: Token, item: T) -> bool;

    /// Removes and returns the item claimed by `token`.
    ///
    /// An unknown or already-taken token yields `None`.
    fn take(&self, token: Token) -> Option<T>;

    /// Returns `true` if an item is claimed by `token`.
    fn contains(&self, token: Token) -> bool;

    /// Drops every entry.
    fn clear(&self);

    /// Number of produced items that have not been taken yet.
    fn len(&self) -> usize;

    /// Returns `true` if no item is waiting to be taken.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
