use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use super::traits::Interceptor;

/// Identifies one registration; the same interceptor may be registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(Uuid);

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registration {
    id: InterceptorId,
    interceptor: Arc<dyn Interceptor>,
}

/// Registry for managing interceptors
#[derive(Clone)]
pub struct InterceptionRegistry {
    interceptors: Arc<RwLock<Vec<Registration>>>,
    enabled: Arc<RwLock<bool>>,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self {
            interceptors: Arc::new(RwLock::new(Vec::new())),
            enabled: Arc::new(RwLock::new(true)),
        }
    }

    /// Register a new interceptor
    pub fn register(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(Uuid::new_v4());
        tracing::debug!("Registering interceptor: {} ({})", interceptor.name(), id);
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration { id, interceptor });
        id
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unregister(&self, id: InterceptorId) -> bool {
        let mut interceptors = self
            .interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match interceptors.iter().position(|r| r.id == id) {
            Some(index) => {
                let removed = interceptors.remove(index);
                tracing::debug!("Unregistered interceptor: {} ({})", removed.interceptor.name(), id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: InterceptorId) -> bool {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.id == id)
    }

    /// Enable or disable all interceptors
    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.write().unwrap_or_else(PoisonError::into_inner) = enabled;
        tracing::debug!("Interceptors enabled: {}", enabled);
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the number of registered interceptors
    pub fn interceptor_count(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke `f` for every interceptor in registration order.
    ///
    /// Works on a snapshot, so callbacks may register or unregister
    /// (including themselves) without deadlocking.
    pub fn dispatch(&self, f: impl Fn(&dyn Interceptor)) {
        if !self.is_enabled() {
            return;
        }

        let snapshot: Vec<Arc<dyn Interceptor>> = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.interceptor.clone())
            .collect();

        for interceptor in &snapshot {
            f(interceptor.as_ref());
        }
    }
}

impl Default for InterceptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterceptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionRegistry")
            .field("interceptors", &self.interceptor_count())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::context::ConnectionEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInterceptor {
        opened: AtomicUsize,
    }

    impl Interceptor for CountingInterceptor {
        fn opened(&self, _event: &ConnectionEvent<'_>) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "CountingInterceptor"
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = InterceptionRegistry::new();
        let interceptor = Arc::new(CountingInterceptor::default());

        let first = registry.register(interceptor.clone());
        let second = registry.register(interceptor);
        assert_ne!(first, second);
        assert_eq!(registry.interceptor_count(), 2);

        assert!(registry.unregister(first));
        assert!(!registry.unregister(first));
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
        assert_eq!(registry.interceptor_count(), 1);
    }

    #[test]
    fn test_dispatch_respects_enabled_flag() {
        let registry = InterceptionRegistry::new();
        registry.register(Arc::new(CountingInterceptor::default()));

        let calls = AtomicUsize::new(0);
        registry.dispatch(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.set_enabled(false);
        assert!(!registry.is_enabled());
        registry.dispatch(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_allows_unregister_from_callback() {
        let registry = InterceptionRegistry::new();
        let id = registry.register(Arc::new(CountingInterceptor::default()));

        let inner = registry.clone();
        registry.dispatch(|_| {
            inner.unregister(id);
        });
        assert_eq!(registry.interceptor_count(), 0);
    }
}
