use core::future::Future;
use std::{sync::Arc, vec::Vec};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::warn;

use crate::{AsyncEnumerator, Error, Token, traverse::ext::drive_worker};

/// Spreads traversal workers over the [`tokio`](https://docs.rs/tokio)
/// runtime, one spawned task per worker.
///
/// Unlike [`AsyncEnumeratorExt::for_each_concurrent`], the workers advance
/// the enumerator from several threads at once on a multi-threaded runtime.
///
/// [`AsyncEnumeratorExt::for_each_concurrent`]: crate::AsyncEnumeratorExt::for_each_concurrent
pub struct TokioTraversal;

impl TokioTraversal {
    /// Spawns `workers` tasks that advance `enumerator` until the sequence
    /// is exhausted or `cancel` fires, handing every item to `f`. Waits for
    /// all of them and then terminates the pass once.
    ///
    /// A worker that fails cancels its siblings. Returns the number of items
    /// handed to `f`.
    ///
    /// # Errors
    ///
    /// - The first worker error, in spawn order.
    /// - [`Error::WorkerAborted`] if a worker panicked or was cancelled by
    ///   the runtime.
    /// - The terminate error, if every worker succeeded.
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
                tokio::spawn(async move {
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

        let mut consumed = 0;
        for outcome in joined {
            match outcome {
                Ok(result) => consumed += result?,
                Err(_join_error) => {
                    #[cfg(feature = "tracing")]
                    warn!(error = %_join_error, "traversal worker aborted");
                    return Err(Error::WorkerAborted);
                }
            }
        }
        ended?;
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EngineState, FnDriver, LockClaimStore, ObservableEnumerator, ParallelEnumerator,
        SequenceDriver,
    };
    use core::future;
    use std::{
        collections::HashSet,
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    };

    const TOTAL: usize = 16 * 1024;
    const WORKERS: usize = 32;

    fn numbers(
        len: usize,
        ended: Arc<AtomicUsize>,
    ) -> impl SequenceDriver<Item = usize, Handshake = usize, Err = &'static str> + Send + Sync + 'static
    {
        let cursor = Arc::new(AtomicUsize::new(0));
        let rewind = Arc::clone(&cursor);
        FnDriver::new(
            move || Some(cursor.fetch_add(1, Ordering::SeqCst)).filter(|n| *n < len),
            |n, _cancel| async move {
                if n % 64 == 0 {
                    tokio::task::yield_now().await;
                }
                Ok::<_, &'static str>(n)
            },
        )
        .on_ended(move |_abrupt, _cancel| {
            rewind.store(0, Ordering::SeqCst);
            ended.fetch_add(1, Ordering::SeqCst);
            future::ready(Ok(()))
        })
    }

    async fn run_spawned_traversal<E>(enumerator: Arc<E>, ended: &AtomicUsize)
    where
        E: AsyncEnumerator<Item = usize> + Send + Sync + 'static,
        E::Err: 'static,
    {
        let seen = Arc::new(Mutex::new(HashSet::with_capacity(TOTAL)));
        let consumed = {
            let seen = Arc::clone(&seen);
            TokioTraversal::spawn_for_each(
                Arc::clone(&enumerator),
                WORKERS,
                CancellationToken::new(),
                move |_, n| {
                    assert!(seen.lock().unwrap().insert(n), "item {n} handed over twice");
                    future::ready(())
                },
            )
            .await
            .unwrap()
        };

        assert_eq!(consumed, TOTAL);
        assert_eq!(seen.lock().unwrap().len(), TOTAL);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn spawned_workers_hand_over_every_item_once() {
        let ended = Arc::new(AtomicUsize::new(0));
        let enumerator = Arc::new(ParallelEnumerator::new(numbers(TOTAL, Arc::clone(&ended))));
        run_spawned_traversal(Arc::clone(&enumerator), &ended).await;
        assert_eq!(enumerator.state(), EngineState::Idle);
        assert_eq!(enumerator.outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn spawned_workers_with_lock_store() {
        let ended = Arc::new(AtomicUsize::new(0));
        let enumerator = Arc::new(ParallelEnumerator::with_store(
            numbers(TOTAL, Arc::clone(&ended)),
            LockClaimStore::new(),
        ));
        run_spawned_traversal(enumerator, &ended).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn spawned_workers_on_observable_enumerator() {
        let ended = Arc::new(AtomicUsize::new(0));
        let enumerator = ObservableEnumerator::new(numbers(TOTAL, Arc::clone(&ended)));
        let starts = Arc::new(AtomicUsize::new(0));
        {
            let starts = Arc::clone(&starts);
            enumerator.subscribe(crate::Hook::BeforeStart, move |_| {
                starts.fetch_add(1, Ordering::SeqCst);
            });
        }
        run_spawned_traversal(Arc::new(enumerator), &ended).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelling_stops_every_worker() {
        let ended = Arc::new(AtomicUsize::new(0));
        let enumerator = Arc::new(ParallelEnumerator::new(numbers(TOTAL, Arc::clone(&ended))));
        let cancel = CancellationToken::new();
        let handed = Arc::new(AtomicUsize::new(0));

        let consumed = {
            let cancel = cancel.clone();
            let handed = Arc::clone(&handed);
            TokioTraversal::spawn_for_each(
                Arc::clone(&enumerator),
                8,
                cancel.clone(),
                move |_, _| {
                    if handed.fetch_add(1, Ordering::SeqCst) == 100 {
                        cancel.cancel();
                    }
                    future::ready(())
                },
            )
            .await
            .unwrap()
        };

        assert!(consumed > 100 && consumed < TOTAL, "consumed {consumed}");
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(enumerator.state(), EngineState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_worker_is_reported_as_aborted() {
        let ended = Arc::new(AtomicUsize::new(0));
        let enumerator = Arc::new(ParallelEnumerator::new(numbers(TOTAL, Arc::clone(&ended))));
        let panicked = Arc::new(AtomicBool::new(false));

        let result = {
            let panicked = Arc::clone(&panicked);
            TokioTraversal::spawn_for_each(
                Arc::clone(&enumerator),
                4,
                CancellationToken::new(),
                move |_, n| {
                    if n == 7 && !panicked.swap(true, Ordering::SeqCst) {
                        panic!("worker blew up");
                    }
                    future::ready(())
                },
            )
            .await
        };

        assert_eq!(result, Err(Error::WorkerAborted));
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(enumerator.state(), EngineState::Idle);
    }
}
