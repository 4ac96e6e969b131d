use core::marker::PhantomData;

use portable_atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle state of a [`ParallelEnumerator`].
///
/// A traversal pass cycles through
/// `Idle → Advancing → EndOfSequence → Terminating → Idle`. A pass may also be
/// terminated straight from `Advancing` when the consumers give up early.
///
/// [`ParallelEnumerator`]: crate::ParallelEnumerator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EngineState {
    /// No pass is in progress. The next advance starts a new pass.
    Idle = 0,
    /// At least one advance has run and the sequence has not reported its
    /// end yet.
    Advancing = 1,
    /// The driver reported that no more items exist.
    EndOfSequence = 2,
    /// A terminate call owns the enumerator and is resetting it.
    Terminating = 3,
}

/// Progress of the start notifications raised by an observable enumerator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub(crate) enum StartState {
    Initial = 0,
    Initializing = 1,
    Started = 2,
}

/// A small state tag that can live inside an [`AtomicState`].
pub(crate) trait StateTag: Copy {
    fn to_raw(self) -> u8;
    fn from_raw(raw: u8) -> Self;
}

impl StateTag for EngineState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Advancing,
            2 => Self::EndOfSequence,
            _ => Self::Terminating,
        }
    }
}

impl StateTag for StartState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Initial,
            1 => Self::Initializing,
            _ => Self::Started,
        }
    }
}

/// A state tag shared by every caller of one enumerator.
///
/// All transitions go through compare-and-swap; nothing here ever blocks.
pub(crate) struct AtomicState<S: StateTag> {
    #[cfg(feature = "cache-padded")]
    cell: crossbeam_utils::CachePadded<AtomicU8>,
    #[cfg(not(feature = "cache-padded"))]
    cell: AtomicU8,
    _tag: PhantomData<S>,
}

impl<S: StateTag> AtomicState<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            cell: crossbeam_utils::CachePadded::new(AtomicU8::new(initial.to_raw())),
            #[cfg(not(feature = "cache-padded"))]
            cell: AtomicU8::new(initial.to_raw()),
            _tag: PhantomData,
        }
    }

    pub(crate) fn load(&self) -> S {
        S::from_raw(self.cell.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, next: S) {
        self.cell.store(next.to_raw(), Ordering::Release);
    }

    /// Moves from `from` to `to` if the current state is `from`.
    ///
    /// On failure the state actually observed is returned and nothing is
    /// written.
    pub(crate) fn transition(&self, from: S, to: S) -> Result<S, S> {
        self.cell
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(S::from_raw)
            .map_err(S::from_raw)
    }
}

/// Puts the state back to `Idle` when dropped, running `before_idle` first.
///
/// Held by a terminate call for the duration of its reset so the enumerator
/// is reusable no matter how the call ends: success, driver error, or the
/// future being dropped while the termination callback is suspended.
pub(crate) struct ResetOnDrop<'a, F: FnOnce()> {
    state: &'a AtomicState<EngineState>,
    before_idle: Option<F>,
}

impl<'a, F: FnOnce()> ResetOnDrop<'a, F> {
    pub(crate) fn new(state: &'a AtomicState<EngineState>, before_idle: F) -> Self {
        Self {
            state,
            before_idle: Some(before_idle),
        }
    }
}

impl<F: FnOnce()> Drop for ResetOnDrop<'_, F> {
    fn drop(&mut self) {
        if let Some(before_idle) = self.before_idle.take() {
            before_idle();
        }
        self.state.store(EngineState::Idle);
    }
}

/// A spin gate around the few non-suspending steps that must not interleave:
/// the state check, `check_next` and the token mint of an advance, and the
/// state claim of a terminate.
///
/// Nothing awaits while holding it, so a waiter only ever spins for the
/// length of one `check_next` call.
pub(crate) struct MintGate {
    #[cfg(feature = "cache-padded")]
    busy: crossbeam_utils::CachePadded<AtomicBool>,
    #[cfg(not(feature = "cache-padded"))]
    busy: AtomicBool,
}

impl MintGate {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            busy: crossbeam_utils::CachePadded::new(AtomicBool::new(false)),
            #[cfg(not(feature = "cache-padded"))]
            busy: AtomicBool::new(false),
        }
    }

    pub(crate) fn enter(&self) -> MintGuard<'_> {
        while self
            .busy
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.busy.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        MintGuard { gate: self }
    }
}

/// Releases the [`MintGate`] when dropped, including when `check_next`
/// panics.
pub(crate) struct MintGuard<'a> {
    gate: &'a MintGate,
}

impl Drop for MintGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
