use core::future::Future;

use portable_atomic::{AtomicI64, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

use crate::{
    AsyncEnumerator, ClaimStore, DefaultClaimStore, EngineState, Error, SequenceDriver, Token,
    state::{AtomicState, MintGate, ResetOnDrop},
};

/// Low bits of a claim-store key that hold the token. The pass generation
/// sits above them, so a pass holds at most `2^40 - 1` tokens.
const TOKEN_BITS: u32 = 40;
const TOKEN_MASK: i64 = (1 << TOKEN_BITS) - 1;
const GENERATION_MASK: u64 = (1 << (63 - TOKEN_BITS)) - 1;

/// A freshly minted token and the pass it was minted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ticket {
    generation: u64,
    token: Token,
}

/// The claim-store key of `token` within pass `generation`.
///
/// Keys of different passes never collide, so an item published late by a
/// fetch that outlived its pass cannot clash with the next pass's tokens.
#[allow(clippy::cast_possible_wrap)]
fn store_key(generation: u64, token: Token) -> Token {
    let generation = (generation & GENERATION_MASK) as i64;
    Token::from_raw((generation << TOKEN_BITS) | token.to_raw())
}

/// A lock-free enumerator that many workers may advance at the same time.
///
/// Each successful [`advance`] mints a unique [`Token`], fetches the item
/// through the [`SequenceDriver`] and parks it in a [`ClaimStore`] under that
/// token. The worker later calls [`redeem`] to take the item out, exactly
/// once. Fetches issued by different workers run concurrently and may
/// complete in any order.
///
/// The lifecycle tag, the token counter and the pass generation are plain
/// atomics; no lock is held across the enumerator as a whole. The state
/// check, `check_next` call and token mint of an advance run as one short
/// spin-gated step, so tokens follow the order of the driver's `check_next`
/// results and the driver never sees `check_next` called concurrently. The
/// gate is never held across a fetch.
///
/// Once the driver reports the end of the sequence, [`terminate`] drains the
/// claim store, runs the driver's termination callback and puts the
/// enumerator back into [`EngineState::Idle`], ready for the next pass.
///
/// ## See Also
/// - [`ObservableEnumerator`] for lifecycle notifications
/// - [`WithMetadata`] for attaching a value to an enumerator
///
/// # Example
/// ```
/// use core::convert::Infallible;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use paraseq::{FnDriver, ParallelEnumerator, Token};
/// use tokio_util::sync::CancellationToken;
///
/// # futures::executor::block_on(async {
/// let items = ["a", "b", "c"];
/// let cursor = AtomicUsize::new(0);
/// let driver = FnDriver::new(
///     move || {
///         let index = cursor.fetch_add(1, Ordering::Relaxed);
///         items.get(index).copied()
///     },
///     |item, _| async move { Ok::<_, Infallible>(item) },
/// );
/// let enumerator = ParallelEnumerator::new(driver);
/// let cancel = CancellationToken::new();
///
/// let token = enumerator.advance(&cancel).await.unwrap().unwrap();
/// assert_eq!(token, Token::from_raw(1));
/// assert_eq!(enumerator.redeem(token), Some("a"));
/// assert_eq!(enumerator.redeem(token), None);
/// # });
/// ```
///
/// [`advance`]: ParallelEnumerator::advance
/// [`redeem`]: ParallelEnumerator::redeem
/// [`terminate`]: ParallelEnumerator::terminate
/// [`ObservableEnumerator`]: crate::ObservableEnumerator
/// [`WithMetadata`]: crate::WithMetadata
pub struct ParallelEnumerator<D, S = DefaultClaimStore<<D as SequenceDriver>::Item>>
where
    D: SequenceDriver,
    S: ClaimStore<D::Item>,
{
    state: AtomicState<EngineState>,
    #[cfg(feature = "cache-padded")]
    counter: crossbeam_utils::CachePadded<AtomicI64>,
    #[cfg(not(feature = "cache-padded"))]
    counter: AtomicI64,
    generation: AtomicU64,
    gate: MintGate,
    store: S,
    driver: D,
}

impl<D: SequenceDriver> ParallelEnumerator<D> {
    /// Creates an idle enumerator over `driver`, backed by the
    /// [`DefaultClaimStore`].
    pub fn new(driver: D) -> Self {
        Self::with_store(driver, DefaultClaimStore::default())
    }
}

impl<D, S> ParallelEnumerator<D, S>
where
    D: SequenceDriver,
    S: ClaimStore<D::Item>,
{
    /// Creates an idle enumerator over `driver` that parks produced items in
    /// `store`.
    pub fn with_store(driver: D, store: S) -> Self {
        Self {
            state: AtomicState::new(EngineState::Idle),
            #[cfg(feature = "cache-padded")]
            counter: crossbeam_utils::CachePadded::new(AtomicI64::new(0)),
            #[cfg(not(feature = "cache-padded"))]
            counter: AtomicI64::new(0),
            generation: AtomicU64::new(0),
            gate: MintGate::new(),
            store,
            driver,
        }
    }

    /// Advances the sequence, returning the token that claims the produced
    /// item, or `None` once the sequence is exhausted.
    ///
    /// Advancing is valid from [`EngineState::Idle`] (which starts a new pass)
    /// and [`EngineState::Advancing`]. The call that observes the end of the
    /// sequence returns `None` and moves the enumerator to
    /// [`EngineState::EndOfSequence`].
    ///
    /// Dropping the returned future while the fetch is suspended abandons the
    /// item; nothing is inserted into the claim store. The same holds when the
    /// pass is terminated while the fetch is suspended: the item is dropped
    /// and the call returns `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::AdvanceAfterEnd`] if the end of the sequence was already
    ///   observed in this pass.
    /// - [`Error::AdvanceWhileTerminating`] if a terminate call owns the
    ///   enumerator.
    /// - [`Error::Driver`] if the fetch fails.
    /// - [`Error::DuplicateToken`] if the minted token was already claimed.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, cancel)))]
    pub async fn advance(&self, cancel: &CancellationToken) -> Result<Option<Token>, Error<D::Err>> {
        match self.produce(cancel).await? {
            Some((ticket, item)) => self.claim(ticket, item, |_| {}),
            None => Ok(None),
        }
    }

    /// Takes the item claimed by `token` out of the store.
    ///
    /// Unknown and already-redeemed tokens yield `None`. This never touches
    /// the lifecycle state.
    pub fn redeem(&self, token: Token) -> Option<D::Item> {
        self.store.take(self.key(token)?)
    }

    /// Like [`Self::redeem`], but treats a missing item as an error.
    ///
    /// Useful in tests and debug builds to catch workers that redeem foreign
    /// or stale tokens. Production code that tolerates a racing terminate
    /// should use [`Self::redeem`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownToken`] if nothing is claimed by `token`.
    pub fn try_redeem(&self, token: Token) -> Result<D::Item, Error<D::Err>> {
        self.redeem(token).ok_or(Error::UnknownToken(token))
    }

    /// Ends the current pass.
    ///
    /// Claims the enumerator from [`EngineState::Advancing`] (an *abrupt*
    /// end: the consumers stopped early) or [`EngineState::EndOfSequence`]
    /// (a natural end), resets the token counter, drops every unredeemed item
    /// and runs the driver's termination callback. Items still being fetched
    /// for the ended pass are dropped when their fetch completes. The enumerator returns to
    /// [`EngineState::Idle`] on every exit path, including a failing callback
    /// or a dropped future.
    ///
    /// Returns `true` if a termination callback ran. Terminating an idle
    /// enumerator is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrentTerminate`] if another terminate is in flight.
    /// - [`Error::Driver`] if the termination callback fails.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, cancel)))]
    pub async fn terminate(&self, cancel: &CancellationToken) -> Result<bool, Error<D::Err>> {
        self.terminate_then(cancel, || {}).await
    }

    /// Runs [`Self::terminate`], calling `before_idle` right before the
    /// enumerator returns to [`EngineState::Idle`]. `before_idle` only runs if
    /// this call claimed the pass.
    pub(crate) async fn terminate_then<F>(
        &self,
        cancel: &CancellationToken,
        before_idle: F,
    ) -> Result<bool, Error<D::Err>>
    where
        F: FnOnce() + Send,
    {
        let abrupt = {
            let _gate = self.gate.enter();
            loop {
                let observed = self.state.load();
                let abrupt = match observed {
                    EngineState::Idle => return Ok(false),
                    EngineState::Terminating => return Err(Error::ConcurrentTerminate),
                    EngineState::Advancing => true,
                    EngineState::EndOfSequence => false,
                };
                if self
                    .state
                    .transition(observed, EngineState::Terminating)
                    .is_ok()
                {
                    break abrupt;
                }
            }
        };
        let _reset = ResetOnDrop::new(&self.state, before_idle);

        // Fetches still in flight see the new generation and drop their items.
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.counter.store(0, Ordering::Release);
        self.store.clear();

        #[cfg(feature = "tracing")]
        debug!(abrupt, "terminating traversal pass");

        match self.driver.on_ended(abrupt, cancel) {
            Some(on_ended) => {
                on_ended.await.map_err(Error::Driver)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the current lifecycle state.
    ///
    /// The value may be stale by the time it is inspected; use it for
    /// diagnostics, not for deciding whether to advance.
    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// Number of produced items that have not been redeemed yet.
    pub fn outstanding(&self) -> usize {
        self.store.len()
    }

    /// Returns the sequence driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the claim store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The store key of `token` in the current pass, or `None` for a token
    /// that can never have been minted.
    fn key(&self, token: Token) -> Option<Token> {
        (1..=TOKEN_MASK)
            .contains(&token.to_raw())
            .then(|| store_key(self.generation.load(Ordering::Acquire), token))
    }

    /// Whether the pass that minted `ticket` has been terminated since.
    fn is_stale(&self, ticket: Ticket) -> bool {
        let stale = self.generation.load(Ordering::Acquire) != ticket.generation;
        #[cfg(feature = "tracing")]
        if stale {
            debug!(token = %ticket.token, "dropping an item fetched for a terminated pass");
        }
        stale
    }

    /// Runs the state check, `check_next`, token mint and fetch of one
    /// advance, without publishing the item.
    pub(crate) async fn produce(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<(Ticket, D::Item)>, Error<D::Err>> {
        let (ticket, handshake) = {
            let _gate = self.gate.enter();
            match self
                .state
                .transition(EngineState::Idle, EngineState::Advancing)
            {
                Ok(_) | Err(EngineState::Advancing) => {}
                Err(EngineState::EndOfSequence) => return Err(Error::AdvanceAfterEnd),
                Err(_) => return Err(Error::AdvanceWhileTerminating),
            }

            let Some(handshake) = self.driver.check_next() else {
                // Only terminate moves the state away from `Advancing`, and it
                // needs the gate to do so.
                self.state.store(EngineState::EndOfSequence);
                #[cfg(feature = "tracing")]
                debug!("end of sequence observed");
                return Ok(None);
            };

            let raw = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
            debug_assert!(raw <= TOKEN_MASK, "token space of one pass exhausted");
            let ticket = Ticket {
                generation: self.generation.load(Ordering::Acquire),
                token: Token::from_raw(raw),
            };
            (ticket, handshake)
        };

        let item = self
            .driver
            .fetch(handshake, cancel)
            .await
            .map_err(Error::Driver)?;
        Ok(Some((ticket, item)))
    }

    /// Publishes a produced item under its token.
    ///
    /// `on_claim` sees the item right before it is inserted, once the token is
    /// known to be free. Items of a terminated pass are dropped and yield
    /// `None`.
    pub(crate) fn claim<F>(
        &self,
        ticket: Ticket,
        item: D::Item,
        on_claim: F,
    ) -> Result<Option<Token>, Error<D::Err>>
    where
        F: FnOnce(&D::Item),
    {
        if self.is_stale(ticket) {
            return Ok(None);
        }
        let key = store_key(ticket.generation, ticket.token);
        if self.store.contains(key) {
            return Err(Self::cold_duplicate(ticket.token));
        }

        on_claim(&item);
        if !self.store.insert(key, item) {
            return Err(Self::cold_duplicate(ticket.token));
        }
        // A terminate that raced the insert may have cleared the store first.
        if self.is_stale(ticket) {
            drop(self.store.take(key));
            return Ok(None);
        }
        Ok(Some(ticket.token))
    }

    #[cold]
    #[inline(never)]
    fn cold_duplicate(token: Token) -> Error<D::Err> {
        #[cfg(feature = "tracing")]
        tracing::error!(%token, "claim store already held a freshly minted token");
        Error::DuplicateToken(token)
    }
}

impl<D, S> AsyncEnumerator for ParallelEnumerator<D, S>
where
    D: SequenceDriver + Sync,
    D::Item: Send,
    D::Handshake: Send,
    S: ClaimStore<D::Item> + Sync,
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
