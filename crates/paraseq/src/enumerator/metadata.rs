use core::{future::Future, ops::Deref};

use tokio_util::sync::CancellationToken;

use crate::{AsyncEnumerator, Error, Token};

/// An enumerator with an immutable value attached to it.
///
/// The wrapper derefs to the inner enumerator and forwards
/// [`AsyncEnumerator`], so it can stand in wherever the inner one is
/// expected. To surface the value in lifecycle notifications, give it to
/// [`ObservableEnumerator::with_metadata`] instead.
///
/// # Example
/// ```
/// use core::convert::Infallible;
///
/// use paraseq::{FnDriver, ParallelEnumerator, WithMetadata};
///
/// let driver = FnDriver::new(|| None::<u8>, |n, _| async move { Ok::<_, Infallible>(n) });
/// let enumerator = WithMetadata::new(ParallelEnumerator::new(driver), "nightly-export");
/// assert_eq!(*enumerator.metadata(), "nightly-export");
/// assert_eq!(enumerator.outstanding(), 0);
/// ```
///
/// [`ObservableEnumerator::with_metadata`]: crate::ObservableEnumerator::with_metadata
#[derive(Debug)]
pub struct WithMetadata<E, M> {
    inner: E,
    metadata: M,
}

impl<E, M> WithMetadata<E, M> {
    /// Attaches `metadata` to `inner`.
    pub fn new(inner: E, metadata: M) -> Self {
        Self { inner, metadata }
    }

    /// Returns the attached value.
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Returns the wrapped enumerator.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Splits the wrapper into the enumerator and the attached value.
    pub fn into_parts(self) -> (E, M) {
        (self.inner, self.metadata)
    }
}

impl<E, M> Deref for WithMetadata<E, M> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.inner
    }
}

impl<E, M> AsyncEnumerator for WithMetadata<E, M>
where
    E: AsyncEnumerator,
{
    type Item = E::Item;
    type Err = E::Err;

    fn advance(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Token>, Error<Self::Err>>> + Send {
        self.inner.advance(cancel)
    }

    fn redeem(&self, token: Token) -> Option<Self::Item> {
        self.inner.redeem(token)
    }

    fn terminate(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool, Error<Self::Err>>> + Send {
        self.inner.terminate(cancel)
    }
}
