use core::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AsyncEnumerator, ClaimStore, DefaultClaimStore, EngineState, Error, Event, Hook, HookRegistry,
    ParallelEnumerator, SequenceDriver, SubscriptionId, Token,
    state::{AtomicState, StartState},
};

/// Runs a closure when dropped.
struct Defer<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Defer<F> {
    fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// A [`ParallelEnumerator`] that raises lifecycle notifications.
///
/// Notifications go to the enumerator's own [`HookRegistry`] first and then
/// to the shared registry given to [`Self::with_registry`], if any:
///
/// - [`Hook::BeforeStart`] / [`Hook::AfterStart`] around the first advance of
///   each pass. Concurrent advances racing the first one skip them, so they
///   fire once per pass no matter how many workers start together.
/// - [`Hook::ItemEncountered`] for every item that is successfully claimed,
///   before its token is handed back to the advancing worker.
/// - [`Hook::BeforeEnd`] / [`Hook::AfterEnd`] around every terminate.
///
/// The "after" notifications are raised from drop guards, so they fire even
/// when the wrapped call fails or its future is dropped. Subscribers that
/// panic are ignored; only the enumerator's own errors reach the caller.
///
/// The metadata value `M` is attached to every event payload.
///
/// # Example
/// ```
/// use core::convert::Infallible;
/// use std::sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}};
///
/// use paraseq::{FnDriver, Hook, ObservableEnumerator};
/// use tokio_util::sync::CancellationToken;
///
/// # futures::executor::block_on(async {
/// let cursor = AtomicUsize::new(0);
/// let driver = FnDriver::new(
///     move || (cursor.fetch_add(1, Ordering::Relaxed) == 0).then_some('A'),
///     |item, _| async move { Ok::<_, Infallible>(item) },
/// );
/// let enumerator = ObservableEnumerator::with_metadata(driver, "letters");
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// for hook in [Hook::BeforeStart, Hook::AfterStart, Hook::ItemEncountered, Hook::BeforeEnd, Hook::AfterEnd] {
///     let log = Arc::clone(&log);
///     enumerator.subscribe(hook, move |event| log.lock().unwrap().push(event.hook()));
/// }
///
/// let cancel = CancellationToken::new();
/// let token = enumerator.advance(&cancel).await.unwrap().unwrap();
/// assert_eq!(enumerator.redeem(token), Some('A'));
/// assert_eq!(enumerator.advance(&cancel).await.unwrap(), None);
/// enumerator.terminate(&cancel).await.unwrap();
///
/// assert_eq!(
///     *log.lock().unwrap(),
///     [Hook::BeforeStart, Hook::AfterStart, Hook::ItemEncountered, Hook::BeforeEnd, Hook::AfterEnd]
/// );
/// # });
/// ```
pub struct ObservableEnumerator<D, S = DefaultClaimStore<<D as SequenceDriver>::Item>, M = ()>
where
    D: SequenceDriver,
    S: ClaimStore<D::Item>,
{
    inner: ParallelEnumerator<D, S>,
    start: AtomicState<StartState>,
    hooks: HookRegistry<D::Item, M>,
    shared: Option<Arc<HookRegistry<D::Item, M>>>,
    metadata: M,
}

impl<D: SequenceDriver> ObservableEnumerator<D> {
    /// Creates an observable enumerator over `driver` with no metadata.
    pub fn new(driver: D) -> Self {
        Self::from_enumerator(ParallelEnumerator::new(driver), ())
    }
}

impl<D: SequenceDriver, M> ObservableEnumerator<D, DefaultClaimStore<D::Item>, M> {
    /// Creates an observable enumerator over `driver` whose events carry
    /// `metadata`.
    pub fn with_metadata(driver: D, metadata: M) -> Self {
        Self::from_enumerator(ParallelEnumerator::new(driver), metadata)
    }
}

impl<D, S, M> ObservableEnumerator<D, S, M>
where
    D: SequenceDriver,
    S: ClaimStore<D::Item>,
{
    /// Wraps an existing enumerator.
    pub fn from_enumerator(inner: ParallelEnumerator<D, S>, metadata: M) -> Self {
        Self {
            inner,
            start: AtomicState::new(StartState::Initial),
            hooks: HookRegistry::new(),
            shared: None,
            metadata,
        }
    }

    /// Also delivers every event to `registry`, after this enumerator's own
    /// subscribers.
    ///
    /// The registry is read at each dispatch, so subscribers added to it
    /// later still fire.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<HookRegistry<D::Item, M>>) -> Self {
        self.shared = Some(registry);
        self
    }

    /// Subscribes to `hook` on this enumerator only.
    pub fn subscribe<F>(&self, hook: Hook, subscriber: F) -> SubscriptionId
    where
        F: Fn(&Event<'_, D::Item, M>) + Send + Sync + 'static,
    {
        self.hooks.subscribe(hook, subscriber)
    }

    /// This enumerator's own subscribers.
    pub fn hooks(&self) -> &HookRegistry<D::Item, M> {
        &self.hooks
    }

    /// The shared registry, if one was attached.
    pub fn registry(&self) -> Option<&Arc<HookRegistry<D::Item, M>>> {
        self.shared.as_ref()
    }

    /// The value attached to every event.
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// The wrapped enumerator.
    pub fn inner(&self) -> &ParallelEnumerator<D, S> {
        &self.inner
    }

    /// Advances the sequence; see [`ParallelEnumerator::advance`].
    ///
    /// # Errors
    ///
    /// Same as [`ParallelEnumerator::advance`]. Subscriber panics never
    /// surface here.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, cancel)))]
    pub async fn advance(&self, cancel: &CancellationToken) -> Result<Option<Token>, Error<D::Err>> {
        let produced = if self
            .start
            .transition(StartState::Initial, StartState::Initializing)
            .is_ok()
        {
            self.raise(&Event::BeforeStart {
                metadata: &self.metadata,
            });
            let _after_start = Defer::new(|| self.finish_start());
            self.inner.produce(cancel).await?
        } else {
            self.inner.produce(cancel).await?
        };

        let Some((ticket, item)) = produced else {
            return Ok(None);
        };
        self.inner.claim(ticket, item, |item| {
            self.raise(&Event::ItemEncountered {
                item,
                metadata: &self.metadata,
            });
        })
    }

    /// See [`ParallelEnumerator::redeem`].
    pub fn redeem(&self, token: Token) -> Option<D::Item> {
        self.inner.redeem(token)
    }

    /// See [`ParallelEnumerator::try_redeem`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownToken`] if nothing is claimed by `token`.
    pub fn try_redeem(&self, token: Token) -> Result<D::Item, Error<D::Err>> {
        self.inner.try_redeem(token)
    }

    /// Ends the current pass; see [`ParallelEnumerator::terminate`].
    ///
    /// [`Hook::BeforeEnd`] and [`Hook::AfterEnd`] are raised on every call,
    /// including no-op calls on an idle enumerator. A call that ends a pass
    /// re-arms the start notifications for the next one.
    ///
    /// # Errors
    ///
    /// Same as [`ParallelEnumerator::terminate`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, cancel)))]
    pub async fn terminate(&self, cancel: &CancellationToken) -> Result<bool, Error<D::Err>> {
        self.raise(&Event::BeforeEnd {
            metadata: &self.metadata,
        });
        let _after_end = Defer::new(|| {
            self.raise(&Event::AfterEnd {
                metadata: &self.metadata,
            });
        });
        // Re-armed before the inner state returns to idle, so the first
        // advance of the next pass always sees a fresh start state.
        let start = &self.start;
        self.inner
            .terminate_then(cancel, move || start.store(StartState::Initial))
            .await
    }

    /// See [`ParallelEnumerator::state`].
    pub fn state(&self) -> EngineState {
        self.inner.state()
    }

    /// See [`ParallelEnumerator::outstanding`].
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding()
    }

    fn finish_start(&self) {
        self.raise(&Event::AfterStart {
            metadata: &self.metadata,
        });
        let _ = self
            .start
            .transition(StartState::Initializing, StartState::Started);
    }

    fn raise(&self, event: &Event<'_, D::Item, M>) {
        self.hooks.dispatch(event);
        if let Some(shared) = &self.shared {
            shared.dispatch(event);
        }
    }
}

impl<D, S, M> AsyncEnumerator for ObservableEnumerator<D, S, M>
where
    D: SequenceDriver + Sync,
    D::Item: Send,
    D::Handshake: Send,
    S: ClaimStore<D::Item> + Sync,
    M: Sync,
{
    type Item = D::Item;
    type Err = D::Err;

    fn advance(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Token>, Error<Self::Err>>> + Send {
        self.advance(cancel)
    }

    fn redeem(&self, token: Token) -> Option<Self::Item> {
        self.redeem(token)
    }

    fn terminate(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool, Error<Self::Err>>> + Send {
        self.terminate(cancel)
    }
}
