use core::future::{self, Future};
use std::vec::Vec;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::trace;

use crate::{
    AsyncEnumerator, Error, Token,
    mutex::{Mutex, into_inner, lock},
};

/// Concurrent traversal on top of any [`AsyncEnumerator`].
///
/// The workers started here are polled by the calling task, so fetches
/// overlap but never run in parallel. To spread workers over threads use a
/// runtime adapter such as [`TokioTraversal`] or [`SmolTraversal`].
///
/// ## Features
/// - ✅ Works on any executor
/// - ✅ Terminates the pass exactly once, after every worker stopped
/// - ❌ No thread-level parallelism
///
/// # Example
/// ```
/// use core::convert::Infallible;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use paraseq::{AsyncEnumeratorExt, FnDriver, ParallelEnumerator};
/// use tokio_util::sync::CancellationToken;
///
/// # futures::executor::block_on(async {
/// let cursor = AtomicU32::new(0);
/// let driver = FnDriver::new(
///     move || Some(cursor.fetch_add(1, Ordering::Relaxed)).filter(|n| *n < 100),
///     |n, _| async move { Ok::<_, Infallible>(n) },
/// );
/// let enumerator = ParallelEnumerator::new(driver);
///
/// let items = enumerator
///     .collect_concurrent(4, &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(items.len(), 100);
/// # });
/// ```
///
/// [`TokioTraversal`]: crate::TokioTraversal
/// [`SmolTraversal`]: crate::SmolTraversal
pub trait AsyncEnumeratorExt: AsyncEnumerator {
    /// Runs `workers` advance/redeem loops until the sequence is exhausted
    /// or `cancel` fires, handing every item to `f`. Then terminates the
    /// pass.
    ///
    /// `workers` is clamped to at least one. Returns the number of items
    /// handed to `f`.
    ///
    /// # Errors
    ///
    /// The first error raised by any worker. The remaining workers are
    /// dropped and the pass is still terminated. A failing terminate is
    /// reported if the workers themselves succeeded.
    fn for_each_concurrent<F, Fut>(
        &self,
        workers: usize,
        cancel: &CancellationToken,
        f: F,
    ) -> impl Future<Output = Result<usize, Error<Self::Err>>> + Send
    where
        Self: Sync,
        Self::Item: Send,
        F: Fn(Token, Self::Item) -> Fut + Send + Sync,
        Fut: Future<Output = ()> + Send,
    {
        async move {
            let loops = (0..workers.max(1)).map(|_| drive_worker(self, cancel, &f));
            let consumed = try_join_all(loops).await;
            let ended = self.terminate(cancel).await;
            let consumed = consumed?.into_iter().sum();
            ended?;
            Ok(consumed)
        }
    }

    /// Collects every item of one pass, ordered by token.
    ///
    /// # Errors
    ///
    /// Same as [`Self::for_each_concurrent`]. Items collected before the
    /// failure are dropped.
    fn collect_concurrent(
        &self,
        workers: usize,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<(Token, Self::Item)>, Error<Self::Err>>> + Send
    where
        Self: Sync,
        Self::Item: Send,
    {
        async move {
            let collected = Mutex::new(Vec::new());
            self.for_each_concurrent(workers, cancel, |token, item| {
                lock(&collected).push((token, item));
                future::ready(())
            })
            .await?;

            let mut collected = into_inner(collected);
            collected.sort_unstable_by_key(|(token, _)| *token);
            Ok(collected)
        }
    }
}

impl<E: AsyncEnumerator + ?Sized> AsyncEnumeratorExt for E {}

/// One traversal worker. Advances, redeems and hands the item to `f` until
/// the sequence ends or `cancel` fires.
pub(crate) async fn drive_worker<E, F, Fut>(
    enumerator: &E,
    cancel: &CancellationToken,
    f: &F,
) -> Result<usize, Error<E::Err>>
where
    E: AsyncEnumerator + ?Sized,
    F: Fn(Token, E::Item) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut consumed = 0;
    while !cancel.is_cancelled() {
        let token = match enumerator.advance(cancel).await {
            Ok(Some(token)) => token,
            // another worker already saw the end of this pass
            Ok(None) | Err(Error::AdvanceAfterEnd) => break,
            Err(err) => return Err(err),
        };
        if let Some(item) = enumerator.redeem(token) {
            f(token, item).await;
            consumed += 1;
        }
    }

    #[cfg(feature = "tracing")]
    trace!(consumed, cancelled = cancel.is_cancelled(), "traversal worker finished");
    Ok(consumed)
}
