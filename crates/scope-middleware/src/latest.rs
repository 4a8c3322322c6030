//! Latest-value-wins channels.
//!
//! A thin layer over [`tokio::sync::watch`]: the sender overwrites a single
//! slot and never waits, readers either peek at the newest value or consume
//! it once.
//!
//! ```
//! use scope_middleware::latest;
//!
//! let (tx, mut rx) = latest::<u32>();
//! tx.publish(1);
//! tx.publish(2);
//! assert_eq!(rx.take_fresh(), Some(2));
//! assert_eq!(rx.take_fresh(), None);
//! assert_eq!(rx.peek(), Some(2));
//! ```

use tokio::sync::watch;

/// Create a connected sender/receiver pair with no initial value.
pub fn latest<T: Clone>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = watch::channel(None);
    (LatestSender { inner: tx }, LatestReceiver { inner: rx })
}

#[derive(Debug)]
pub struct LatestSender<T> {
    inner: watch::Sender<Option<T>>,
}

impl<T: Clone> LatestSender<T> {
    /// Replace the current value. Succeeds whether or not anyone is
    /// listening.
    pub fn publish(&self, value: T) {
        self.inner.send_replace(Some(value));
    }

    /// New receiver that treats the current value as already seen.
    pub fn subscribe(&self) -> LatestReceiver<T> {
        LatestReceiver { inner: self.inner.subscribe() }
    }
}

#[derive(Debug, Clone)]
pub struct LatestReceiver<T> {
    inner: watch::Receiver<Option<T>>,
}

impl<T: Clone> LatestReceiver<T> {
    /// The newest value if it has not been taken by this receiver yet.
    pub fn take_fresh(&mut self) -> Option<T> {
        if self.inner.has_changed().unwrap_or(false) {
            self.inner.borrow_and_update().clone()
        } else {
            None
        }
    }

    /// The newest value, seen or not.
    pub fn peek(&self) -> Option<T> {
        self.inner.borrow().clone()
    }

    /// Wait until a new value is published and mark it as seen. Returns
    /// `false` once the sender is gone.
    pub async fn changed(&mut self) -> bool {
        self.inner.changed().await.is_ok()
    }
}
