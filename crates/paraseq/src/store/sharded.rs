use dashmap::{DashMap, mapref::entry::Entry};

use crate::{ClaimStore, Token};

/// A claim store sharded across many independently locked buckets.
///
/// Backed by [`DashMap`]: two tokens only contend when they hash to the same
/// shard, so one worker redeeming its item never waits on another worker's
/// insert. This is the default store when the `sharded` feature is enabled.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Per-shard synchronization
///
/// ## See Also
/// - [`LockClaimStore`]
///
/// [`LockClaimStore`]: crate::LockClaimStore
pub struct ShardedClaimStore<T> {
    entries: DashMap<Token, T>,
}

impl<T> ShardedClaimStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Creates an empty store with room for `capacity` outstanding items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }
}

impl<T> Default for ShardedClaimStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ClaimStore<T> for ShardedClaimStore<T> {
    fn insert(&self, token: Token, item: T) -> bool {
        match self.entries.entry(token) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(item);
                true
            }
        }
    }

    fn take(&self, token: Token) -> Option<T> {
        self.entries.remove(&token).map(|(_, item)| item)
    }

    fn contains(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
