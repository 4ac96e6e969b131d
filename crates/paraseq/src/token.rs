use core::fmt;

/// A single-use claim on one produced item.
///
/// Tokens are minted by [`ParallelEnumerator::advance`] in strictly increasing
/// order, starting at `1` for every traversal pass. A token stays unique for
/// as long as it is outstanding within its pass; once the enumerator is
/// terminated the counter resets and values are reused by the next pass.
///
/// Redeeming a token hands the item over exactly once. Redeeming it a second
/// time, or redeeming a token that was never issued, yields nothing.
///
/// # Example
///
/// ```
/// use paraseq::Token;
///
/// let token = Token::from_raw(7);
/// assert_eq!(token.to_raw(), 7);
/// assert_eq!(token.to_string(), "7");
/// ```
///
/// [`ParallelEnumerator::advance`]: crate::ParallelEnumerator::advance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[repr(transparent)]
pub struct Token(i64);

impl Token {
    /// Wraps a raw token value.
    ///
    /// Only tokens returned by an enumerator can be redeemed for an item, but
    /// any value can be constructed (e.g. to look up a store entry in tests).
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the underlying counter value.
    pub const fn to_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Token> for i64 {
    fn from(token: Token) -> Self {
        token.0
    }
}
