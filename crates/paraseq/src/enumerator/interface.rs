use core::{fmt, future::Future};

use tokio_util::sync::CancellationToken;

use crate::{Error, Token};

/// The advance / redeem / terminate protocol shared by every enumerator
/// flavor.
///
/// Implemented by [`ParallelEnumerator`], [`ObservableEnumerator`] and
/// [`WithMetadata`], so traversal code can be written once for the plain and
/// the instrumented engine.
///
/// [`ParallelEnumerator`]: crate::ParallelEnumerator
/// [`ObservableEnumerator`]: crate::ObservableEnumerator
/// [`WithMetadata`]: crate::WithMetadata
pub trait AsyncEnumerator {
    /// The items this enumerator hands out.
    type Item;

    /// The error type of the underlying sequence driver.
    type Err: fmt::Debug + Send;

    /// Checks for the next item and, if one exists, produces it and returns
    /// the token that claims it.
    ///
    /// `Ok(None)` means the sequence is exhausted, or that the pass this
    /// advance belonged to was terminated while the item was being fetched.
    ///
    /// # Errors
    ///
    /// - [`Error::AdvanceAfterEnd`] if the end of the sequence was already
    ///   observed in this pass. Workers racing the one that saw the end
    ///   receive this and should stop.
    /// - [`Error::AdvanceWhileTerminating`] if a terminate call owns the
    ///   enumerator.
    /// - [`Error::Driver`] if the driver's fetch fails.
    /// - [`Error::DuplicateToken`] if the claim store already held the minted
    ///   token (a defect in the enumerator).
    fn advance(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Token>, Error<Self::Err>>> + Send;

    /// Exchanges `token` for its item, exactly once.
    ///
    /// Unknown and already-redeemed tokens yield `None`.
    fn redeem(&self, token: Token) -> Option<Self::Item>;

    /// Ends the current pass and resets the enumerator for reuse.
    ///
    /// Returns `true` if a termination callback ran, `false` if none is
    /// configured or the enumerator was already idle.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrentTerminate`] if another terminate is in flight.
    /// - [`Error::Driver`] if the termination callback fails. The enumerator
    ///   is reset regardless.
    fn terminate(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool, Error<Self::Err>>> + Send;
}
