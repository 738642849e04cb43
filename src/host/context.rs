use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

type DisposeListener = Box<dyn FnOnce(&DbContext) + Send>;

/// Identifies one [`DbContext::on_dispose`] registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisposeSubscription(u64);

/// Unit-of-work object that issues database operations.
///
/// Identity is the allocation itself: two contexts with the same name are
/// different contexts. Interested parties subscribe through [`DbContext::on_dispose`].
pub struct DbContext {
    id: Uuid,
    name: String,
    disposed: AtomicBool,
    next_subscription: AtomicU64,
    dispose_listeners: Mutex<Vec<(DisposeSubscription, DisposeListener)>>,
}

impl DbContext {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            disposed: AtomicBool::new(false),
            next_subscription: AtomicU64::new(0),
            dispose_listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Register a callback fired once when the context is disposed.
    /// Runs immediately if the context is already disposed.
    ///
    /// The returned subscription can be passed to [`DbContext::remove_dispose_listener`].
    pub fn on_dispose<F>(&self, listener: F) -> DisposeSubscription
    where
        F: FnOnce(&DbContext) + Send + 'static,
    {
        let subscription = DisposeSubscription(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        {
            let mut listeners = self
                .dispose_listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_disposed() {
                listeners.push((subscription, Box::new(listener)));
                return subscription;
            }
        }
        listener(self);
        subscription
    }

    /// Drop a pending dispose listener. Returns false if it already ran or was removed.
    pub fn remove_dispose_listener(&self, subscription: DisposeSubscription) -> bool {
        let mut listeners = self
            .dispose_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        listeners.len() != before
    }

    /// Number of listeners waiting for dispose
    pub fn dispose_listener_count(&self) -> usize {
        self.dispose_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Dispose the context and notify listeners. Safe to call repeatedly.
    pub fn dispose(&self) {
        let listeners = {
            let mut listeners = self
                .dispose_listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *listeners)
        };

        tracing::debug!(
            "Disposing context {} ({}), notifying {} listener(s)",
            self.name,
            self.id,
            listeners.len()
        );
        for (_, listener) in listeners {
            listener(self);
        }
    }
}

impl Drop for DbContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispose_fires_listeners_once() {
        let ctx = DbContext::new("orders");
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        ctx.on_dispose(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ctx.dispose();
        ctx.dispose();
        assert!(ctx.is_disposed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_after_dispose_runs_immediately() {
        let ctx = DbContext::new("orders");
        ctx.dispose();

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        ctx.on_dispose(move |_| flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_disposes() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let ctx = DbContext::new("orders");
        ctx.on_dispose(move |c| {
            assert_eq!(c.name(), "orders");
            flag.store(true, Ordering::SeqCst);
        });

        drop(ctx);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_removed_listener_never_fires() {
        let ctx = DbContext::new("orders");
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let kept = ctx.on_dispose(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = fired.clone();
        let removed = ctx.on_dispose(move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        assert_ne!(kept, removed);
        assert_eq!(ctx.dispose_listener_count(), 2);

        assert!(ctx.remove_dispose_listener(removed));
        assert!(!ctx.remove_dispose_listener(removed));
        assert_eq!(ctx.dispose_listener_count(), 1);

        ctx.dispose();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.dispose_listener_count(), 0);
        assert!(!ctx.remove_dispose_listener(kept));
    }

    #[test]
    fn test_identity_is_per_instance() {
        let a = DbContext::new("same");
        let b = DbContext::new("same");
        assert_ne!(a.id(), b.id());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
