use core::{fmt, future::Future};

use futures::{FutureExt, future::BoxFuture};
use tokio_util::sync::CancellationToken;

use crate::SequenceDriver;

type EndedFn<E> =
    dyn Fn(bool, CancellationToken) -> BoxFuture<'static, Result<(), E>> + Send + Sync;

/// A [`SequenceDriver`] assembled from closures.
///
/// `check` decides whether another item exists and returns its handshake;
/// `fetch` turns the handshake into the item. An optional termination
/// callback is attached with [`FnDriver::on_ended`].
///
/// The closures receive an owned clone of the caller's [`CancellationToken`]
/// so the futures they return can be `'static`.
///
/// # Example
///
/// ```
/// use core::convert::Infallible;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use paraseq::FnDriver;
///
/// let cursor = AtomicU32::new(0);
/// let driver = FnDriver::new(
///     move || {
///         let n = cursor.fetch_add(1, Ordering::Relaxed);
///         (n < 3).then_some(n)
///     },
///     |n, _cancel| async move { Ok::<_, Infallible>(n * 10) },
/// )
/// .on_ended(|abrupt, _cancel| async move {
///     assert!(!abrupt);
///     Ok::<_, Infallible>(())
/// });
/// # let _ = driver;
/// ```
pub struct FnDriver<C, F, E> {
    check: C,
    fetch: F,
    on_ended: Option<Box<EndedFn<E>>>,
}

impl<C, F, E> FnDriver<C, F, E> {
    /// Creates a driver with no termination callback.
    pub fn new<H, T, Fut>(check: C, fetch: F) -> Self
    where
        C: Fn() -> Option<H>,
        F: Fn(H, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Self {
            check,
            fetch,
            on_ended: None,
        }
    }

    /// Attaches the callback invoked once per terminate.
    #[must_use]
    pub fn on_ended<G, Fut>(mut self, on_ended: G) -> Self
    where
        G: Fn(bool, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.on_ended = Some(Box::new(move |abrupt, cancel| on_ended(abrupt, cancel).boxed()));
        self
    }

    /// Returns `true` if a termination callback is attached.
    pub fn has_on_ended(&self) -> bool {
        self.on_ended.is_some()
    }
}

impl<C, F, E> fmt::Debug for FnDriver<C, F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDriver")
            .field("on_ended", &self.on_ended.is_some())
            .finish_non_exhaustive()
    }
}

impl<C, F, H, T, E, Fut> SequenceDriver for FnDriver<C, F, E>
where
    C: Fn() -> Option<H>,
    F: Fn(H, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send,
    E: fmt::Debug + Send,
{
    type Item = T;
    type Handshake = H;
    type Err = E;

    fn check_next(&self) -> Option<H> {
        (self.check)()
    }

    fn fetch(
        &self,
        handshake: H,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<T, E>> + Send {
        (self.fetch)(handshake, cancel.clone())
    }

    fn on_ended(
        &self,
        abrupt: bool,
        cancel: &CancellationToken,
    ) -> Option<impl Future<Output = Result<(), E>> + Send> {
        self.on_ended
            .as_ref()
            .map(|on_ended| on_ended(abrupt, cancel.clone()))
    }
}
