use core::fmt;

/// A point in the traversal lifecycle that subscribers can attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Raised once per pass, before the first advance runs.
    BeforeStart,
    /// Raised once per pass, after the first advance finished (successfully
    /// or not).
    AfterStart,
    /// Raised for every item an advance produced.
    ItemEncountered,
    /// Raised before a terminate call runs.
    BeforeEnd,
    /// Raised after a terminate call finished (successfully or not).
    AfterEnd,
}

impl Hook {
    pub(crate) const COUNT: usize = 5;

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// The payload delivered to a subscriber.
///
/// Every variant carries the enumerator's metadata; `()` when none was
/// attached.
pub enum Event<'a, T, M> {
    /// See [`Hook::BeforeStart`].
    BeforeStart {
        /// The enumerator's metadata.
        metadata: &'a M,
    },
    /// See [`Hook::AfterStart`].
    AfterStart {
        /// The enumerator's metadata.
        metadata: &'a M,
    },
    /// See [`Hook::ItemEncountered`].
    ItemEncountered {
        /// The item that was produced.
        item: &'a T,
        /// The enumerator's metadata.
        metadata: &'a M,
    },
    /// See [`Hook::BeforeEnd`].
    BeforeEnd {
        /// The enumerator's metadata.
        metadata: &'a M,
    },
    /// See [`Hook::AfterEnd`].
    AfterEnd {
        /// The enumerator's metadata.
        metadata: &'a M,
    },
}

impl<'a, T, M> Event<'a, T, M> {
    /// The hook this event is raised for.
    pub const fn hook(&self) -> Hook {
        match self {
            Self::BeforeStart { .. } => Hook::BeforeStart,
            Self::AfterStart { .. } => Hook::AfterStart,
            Self::ItemEncountered { .. } => Hook::ItemEncountered,
            Self::BeforeEnd { .. } => Hook::BeforeEnd,
            Self::AfterEnd { .. } => Hook::AfterEnd,
        }
    }

    /// The metadata of the enumerator raising the event.
    pub const fn metadata(&self) -> &'a M {
        match self {
            Self::BeforeStart { metadata }
            | Self::AfterStart { metadata }
            | Self::ItemEncountered { metadata, .. }
            | Self::BeforeEnd { metadata }
            | Self::AfterEnd { metadata } => *metadata,
        }
    }

    /// The produced item, for [`Hook::ItemEncountered`] events.
    pub const fn item(&self) -> Option<&'a T> {
        match self {
            Self::ItemEncountered { item, .. } => Some(*item),
            _ => None,
        }
    }
}

impl<T: fmt::Debug, M: fmt::Debug> fmt::Debug for Event<'_, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Event");
        out.field("hook", &self.hook());
        if let Some(item) = self.item() {
            out.field("item", item);
        }
        out.field("metadata", self.metadata()).finish()
    }
}
