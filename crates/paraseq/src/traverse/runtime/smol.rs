use core::future::Future;
use std::{sync::Arc, vec::Vec};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{AsyncEnumerator, Error, Token, traverse::ext::drive_worker};

/// Spreads traversal workers over the [`smol`](https://docs.rs/smol) global
/// executor, one spawned task per worker.
///
/// Behaves like [`TokioTraversal`], except that a panicking worker resumes
/// its panic in the caller once every other worker has stopped.
///
/// [`TokioTraversal`]: crate::TokioTraversal
pub struct SmolTraversal;

impl SmolTraversal {
    /// Spawns `workers` tasks that advance `enumerator` until the sequence
    /// is exhausted or `cancel` fires, handing every item to `f`. Waits for
    /// all of them and then terminates the pass once.
    ///
    /// # Errors
    ///
    /// The first worker error in spawn order, or else the terminate error.
    pub async fn spawn_for_each<E, F, Fut>(
        enumerator: Arc<E>,
        workers: usize,
        cancel: CancellationToken,
        f: F,
    ) -> Result<usize, Error<E::Err>>
    where
        E: AsyncEnumerator + Send + Sync + 'static,
        E::Item: Send,
        E::Err: 'static,
        F: Fn(Token, E::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let f = Arc::new(f);
        let stop = cancel.child_token();
        let tasks: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let enumerator = Arc::clone(&enumerator);
                let stop = stop.clone();
                let f = Arc::clone(&f);
                smol::spawn(async move {
                    let result = drive_worker(&*enumerator, &stop, &*f).await;
                    if result.is_err() {
                        stop.cancel();
                    }
                    result
                })
            })
            .collect();

        let joined = join_all(tasks).await;
        let ended = enumerator.terminate(&cancel).await;
        let consumed = joined.into_iter().sum::<Result<usize, _>>()?;
        ended?;
        Ok(consumed)
    }
}
