use arc_swap::ArcSwap;
use std::sync::Arc;

/// Single-writer, many-reader holder for a device's latest decoded state.
///
/// The receive path builds a complete new value and publishes it with one
/// atomic pointer swap, so a reader never sees half of one frame and half of
/// the next.
pub struct SnapshotCell<T> {
    inner: ArcSwap<T>,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ArcSwap::from_pointee(value),
        }
    }

    /// Latest published value.
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Derive the next value from the current one and publish it.
    ///
    /// Only the receive context calls this, so there is no lost-update race
    /// between the load and the store.
    pub fn publish_with<E>(&self, next: impl FnOnce(&T) -> Result<T, E>) -> Result<(), E> {
        let current = self.inner.load();
        let value = next(&current)?;
        self.inner.store(Arc::new(value));
        Ok(())
    }

    pub fn replace(&self, value: T) {
        self.inner.store(Arc::new(value));
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SnapshotCell").field(&*self.inner.load()).finish()
    }
}
