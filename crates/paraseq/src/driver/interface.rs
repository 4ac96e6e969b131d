use core::{fmt, future::Future};

use tokio_util::sync::CancellationToken;

/// The production logic behind a parallel enumerator.
///
/// A driver decides what "the sequence" is. The enumerator consults it in two
/// steps per advance:
///
/// 1. [`check_next`] decides, without suspending, whether another item exists
///    and returns the handshake data needed to fetch it.
/// 2. [`fetch`] materializes the item from that handshake. It may suspend,
///    and fetches started by different advances run concurrently.
///
/// The enumerator never runs two `check_next` calls at once, and never runs
/// one while a terminate is resetting the pass, so a cursor behind `&self`
/// only needs interior mutability, not arbitration. Tokens are minted in the
/// order of the `check_next` calls that returned `Some`. `check_next` must not
/// call back into the enumerator.
///
/// # Example
///
/// ```
/// use core::convert::Infallible;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use paraseq::SequenceDriver;
/// use tokio_util::sync::CancellationToken;
///
/// struct Squares {
///     cursor: AtomicUsize,
///     len: usize,
/// }
///
/// impl SequenceDriver for Squares {
///     type Item = usize;
///     type Handshake = usize;
///     type Err = Infallible;
///
///     fn check_next(&self) -> Option<usize> {
///         let index = self.cursor.fetch_add(1, Ordering::Relaxed);
///         (index < self.len).then_some(index)
///     }
///
///     async fn fetch(&self, index: usize, _: &CancellationToken) -> Result<usize, Infallible> {
///         Ok(index * index)
///     }
/// }
/// ```
///
/// [`check_next`]: SequenceDriver::check_next
/// [`fetch`]: SequenceDriver::fetch
pub trait SequenceDriver {
    /// The items this sequence produces.
    type Item;

    /// Data handed from [`SequenceDriver::check_next`] to
    /// [`SequenceDriver::fetch`] within one advance. It is never stored.
    type Handshake;

    /// The error type of [`SequenceDriver::fetch`] and
    /// [`SequenceDriver::on_ended`].
    type Err: fmt::Debug + Send;

    /// Returns the handshake for the next item, or `None` once the sequence
    /// is exhausted.
    ///
    /// `None` is the only end-of-sequence signal and is not an error.
    fn check_next(&self) -> Option<Self::Handshake>;

    /// Produces the item described by `handshake`.
    ///
    /// `cancel` is the signal passed to the advance that issued this fetch.
    /// Errors propagate to that advance unchanged.
    fn fetch(
        &self,
        handshake: Self::Handshake,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Item, Self::Err>> + Send;

    /// Returns the termination callback for the pass that is ending, if the
    /// driver has one.
    ///
    /// Called exactly once per successful terminate. `abrupt` is `true` when
    /// the consumers stopped before the end of the sequence was observed.
    /// Returning `None` (the default) means no callback is configured.
    fn on_ended(
        &self,
        abrupt: bool,
        cancel: &CancellationToken,
    ) -> Option<impl Future<Output = Result<(), Self::Err>> + Send> {
        let _ = (abrupt, cancel);
        None::<core::future::Ready<Result<(), Self::Err>>>
    }
}
