use core::fmt;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    vec::Vec,
};

use portable_atomic::{AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::warn;

use crate::{
    Event, Hook,
    mutex::{Mutex, lock},
};

type Subscriber<T, M> = Arc<dyn Fn(&Event<'_, T, M>) + Send + Sync>;

/// Identifies one subscription so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber lists for every [`Hook`].
///
/// An [`ObservableEnumerator`] owns one registry for its own subscribers and
/// may additionally be handed a shared, process-wide registry. The shared
/// registry is consulted at every dispatch, so subscribers added after the
/// enumerator was built still see its events.
///
/// Subscribers run synchronously on the thread raising the event. A panic in
/// one subscriber is caught and discarded; the remaining subscribers and the
/// enumeration itself carry on.
///
/// # Example
/// ```
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// use paraseq::{Event, Hook, HookRegistry};
///
/// let registry = HookRegistry::<u32>::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// registry.subscribe(Hook::ItemEncountered, move |event| {
///     counter.fetch_add(*event.item().unwrap() as usize, Ordering::Relaxed);
/// });
///
/// registry.dispatch(&Event::ItemEncountered { item: &5, metadata: &() });
/// assert_eq!(seen.load(Ordering::Relaxed), 5);
/// ```
///
/// [`ObservableEnumerator`]: crate::ObservableEnumerator
pub struct HookRegistry<T, M = ()> {
    hooks: [Mutex<Vec<(SubscriptionId, Subscriber<T, M>)>>; Hook::COUNT],
    next_id: AtomicU64,
}

impl<T, M> HookRegistry<T, M> {
    /// Creates a registry with no subscribers.
    pub fn new() -> Self {
        Self {
            hooks: core::array::from_fn(|_| Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Adds `subscriber` to the list for `hook`.
    ///
    /// Subscribers of one hook are called in subscription order.
    pub fn subscribe<F>(&self, hook: Hook, subscriber: F) -> SubscriptionId
    where
        F: Fn(&Event<'_, T, M>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber: Subscriber<T, M> = Arc::new(subscriber);
        lock(&self.hooks[hook.index()]).push((id, subscriber));
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hooks.iter().any(|list| {
            let mut list = lock(list);
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            list.len() != before
        })
    }

    /// Number of subscribers attached to `hook`.
    pub fn subscriber_count(&self, hook: Hook) -> usize {
        lock(&self.hooks[hook.index()]).len()
    }

    /// Delivers `event` to every subscriber of its hook.
    ///
    /// The list is snapshotted first, so subscribers may (un)subscribe from
    /// inside a callback. Panicking subscribers are skipped over.
    pub fn dispatch(&self, event: &Event<'_, T, M>) {
        let subscribers: Vec<Subscriber<T, M>> = {
            let list = lock(&self.hooks[event.hook().index()]);
            if list.is_empty() {
                return;
            }
            list.iter().map(|(_, subscriber)| Arc::clone(subscriber)).collect()
        };

        for subscriber in subscribers {
            if panic::catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                #[cfg(feature = "tracing")]
                warn!(hook = ?event.hook(), "lifecycle subscriber panicked; ignoring");
            }
        }
    }
}

impl<T, M> Default for HookRegistry<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> fmt::Debug for HookRegistry<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before_start", &self.subscriber_count(Hook::BeforeStart))
            .field("after_start", &self.subscriber_count(Hook::AfterStart))
            .field("item_encountered", &self.subscriber_count(Hook::ItemEncountered))
            .field("before_end", &self.subscriber_count(Hook::BeforeEnd))
            .field("after_end", &self.subscriber_count(Hook::AfterEnd))
            .finish()
    }
}
