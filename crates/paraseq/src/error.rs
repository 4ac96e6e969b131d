use core::convert::Infallible;

use crate::Token;

/// A result type whose error defaults to an [`Error`] over an infallible
/// driver.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors a parallel enumerator can raise.
///
/// The generic parameter `E` is the error type of the [`SequenceDriver`]
/// callbacks. Driver failures are carried through untouched in
/// [`Error::Driver`]; the enumerator attaches no meaning to them.
///
/// The remaining variants fall into two groups:
///
/// - **Protocol violations** ([`Error::AdvanceWhileTerminating`],
///   [`Error::AdvanceAfterEnd`], [`Error::ConcurrentTerminate`]) signal
///   caller misuse. The enumerator
///   state is left untouched, so the call may be retried once the caller's
///   concurrency bug is fixed.
/// - **Internal consistency** ([`Error::DuplicateToken`]) should be
///   unreachable and indicates a defect in the enumerator itself.
///
/// Running out of items, redeeming an unknown token, and terminating an idle
/// enumerator are *not* errors; they are reported through return values.
///
/// [`SequenceDriver`]: crate::SequenceDriver
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E = Infallible> {
    /// An advance was attempted while a terminate call owned the enumerator.
    #[error("tried to advance while the enumerator is terminating")]
    AdvanceWhileTerminating,

    /// An advance was attempted after the end of the sequence had already
    /// been reported and before the pass was terminated.
    ///
    /// Traversal workers that race the one observing the end receive this;
    /// they treat it as exhaustion.
    #[error("tried to advance past the end of the sequence")]
    AdvanceAfterEnd,

    /// A terminate call overlapped another terminate call.
    #[error("concurrent terminate call")]
    ConcurrentTerminate,

    /// A freshly minted token was already present in the claim store.
    #[error("duplicate retrieval token {0}")]
    DuplicateToken(Token),

    /// A strict redeem found no item for the token.
    ///
    /// Only produced by [`ParallelEnumerator::try_redeem`]; the regular
    /// redeem reports a miss as `None`.
    ///
    /// [`ParallelEnumerator::try_redeem`]: crate::ParallelEnumerator::try_redeem
    #[error("no item claimed by token {0}")]
    UnknownToken(Token),

    /// A spawned traversal worker panicked or was cancelled by its runtime.
    #[error("traversal worker aborted")]
    WorkerAborted,

    /// The sequence driver's own callback failed.
    #[error("sequence driver error: {0:?}")]
    Driver(E),
}

impl<E> Error<E> {
    /// Returns `true` for errors caused by advancing or terminating from a
    /// state that does not allow it.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::AdvanceWhileTerminating | Self::AdvanceAfterEnd | Self::ConcurrentTerminate
        )
    }

    /// Returns the driver error, if this is one.
    pub fn into_driver(self) -> Option<E> {
        match self {
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_protocol_violations() {
        assert!(Error::<Infallible>::AdvanceWhileTerminating.is_protocol_violation());
        assert!(Error::<Infallible>::AdvanceAfterEnd.is_protocol_violation());
        assert!(Error::<Infallible>::ConcurrentTerminate.is_protocol_violation());
        assert!(!Error::<Infallible>::DuplicateToken(Token::from_raw(1)).is_protocol_violation());
        assert!(!Error::Driver("boom").is_protocol_violation());
    }

    #[test]
    fn driver_error_passes_through() {
        let err = Error::Driver("disk on fire");
        assert_eq!(err.to_string(), "sequence driver error: \"disk on fire\"");
        assert_eq!(err.into_driver(), Some("disk on fire"));
        assert_eq!(Error::<&str>::ConcurrentTerminate.into_driver(), None);
    }
}
