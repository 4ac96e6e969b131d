use std::collections::HashMap;

use crate::{
    ClaimStore, Token,
    mutex::{Mutex, lock},
};

/// A claim store guarded by a single mutex.
///
/// Every operation takes the same lock, so unrelated tokens contend with each
/// other. Use it where a sharded map is unavailable or undesirable (tiny
/// sequences, constrained targets); otherwise prefer `ShardedClaimStore`.
///
/// ## Features
/// - ✅ Thread-safe
/// - ❌ Per-key synchronization
/// - ✅ No extra dependencies
///
/// # Example
/// ```
/// use paraseq::{ClaimStore, LockClaimStore, Token};
///
/// let store = LockClaimStore::new();
/// assert!(store.insert(Token::from_raw(1), "a"));
/// assert!(!store.insert(Token::from_raw(1), "b"));
/// assert_eq!(store.take(Token::from_raw(1)), Some("a"));
/// assert_eq!(store.take(Token::from_raw(1)), None);
/// ```
pub struct LockClaimStore<T> {
    entries: Mutex<HashMap<Token, T>>,
}

impl<T> LockClaimStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty store with room for `capacity` outstanding items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }
}

impl<T> Default for LockClaimStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ClaimStore<T> for LockClaimStore<T> {
    fn insert(&self, token: Token, item: T) -> bool {
        let mut entries = lock(&self.entries);
        if entries.contains_key(&token) {
            return false;
        }
        entries.insert(token, item);
        true
    }

    fn take(&self, token: Token) -> Option<T> {
        lock(&self.entries).remove(&token)
    }

    fn contains(&self, token: Token) -> bool {
        lock(&self.entries).contains_key(&token)
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}
