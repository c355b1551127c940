//! Session disposable registry
//!
//! Named cancelable registrations owned by one connection, such as a
//! running idle monitor. Entries are released by name or all at once when
//! the connection goes away.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::error::ChannelError;
use crate::Result;

type Release = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct RegistryState {
    entries: Vec<(String, Release)>,
    disposed: bool,
}

#[derive(Default)]
pub struct DisposableRegistry {
    state: Mutex<RegistryState>,
}

impl DisposableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `release` under `key`.
    ///
    /// Fails with `DuplicateKey` if the key is taken. After `dispose_all`
    /// the release runs immediately and the call fails with `Cancelled`.
    pub fn add<F>(&self, key: impl Into<String>, release: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let key = key.into();
        let mut state = self.state.lock();

        if state.disposed {
            drop(state);
            run_release(&key, Box::new(release));
            return Err(ChannelError::Cancelled);
        }

        if state.entries.iter().any(|(existing, _)| *existing == key) {
            return Err(ChannelError::DuplicateKey { key });
        }

        state.entries.push((key, Box::new(release)));
        Ok(())
    }

    /// Release and forget the entry under `key`. Returns false if absent.
    pub fn remove(&self, key: &str) -> bool {
        let entry = {
            let mut state = self.state.lock();
            let position = state.entries.iter().position(|(existing, _)| existing == key);
            position.map(|index| state.entries.remove(index))
        };

        match entry {
            Some((key, release)) => {
                run_release(&key, release);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.iter().any(|(existing, _)| existing == key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Release every remaining entry exactly once, in registration order.
    /// A failing release does not stop the others. Returns the number of
    /// releases that completed; later calls release nothing.
    pub fn dispose_all(&self) -> usize {
        let entries = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.entries)
        };

        entries
            .into_iter()
            .map(|(key, release)| run_release(&key, release))
            .filter(|released| *released)
            .count()
    }
}

fn run_release(key: &str, release: Release) -> bool {
    match catch_unwind(AssertUnwindSafe(release)) {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(key, "Disposable release panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let registry = DisposableRegistry::new();
        registry.add("idle", || {}).unwrap();

        let err = registry.add("idle", || {}).unwrap_err();
        assert!(matches!(err, ChannelError::DuplicateKey { ref key } if key == "idle"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_releases_once() {
        let registry = DisposableRegistry::new();
        let (count, release) = counter();
        registry.add("x", release).unwrap();

        assert!(registry.remove("x"));
        assert!(!registry.remove("x"));
        assert!(!registry.contains("x"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Key is free again
        registry.add("x", || {}).unwrap();
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = DisposableRegistry::new();
        assert!(!registry.remove("missing"));
    }

    #[test]
    fn test_dispose_all_continues_past_failures() {
        let registry = DisposableRegistry::new();
        let (first, release_first) = counter();
        let (last, release_last) = counter();

        registry.add("a", release_first).unwrap();
        registry.add("b", || panic!("release failed")).unwrap();
        registry.add("c", release_last).unwrap();

        assert_eq!(registry.dispose_all(), 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispose_all_is_idempotent() {
        let registry = DisposableRegistry::new();
        let (count, release) = counter();
        registry.add("x", release).unwrap();

        registry.dispose_all();
        assert_eq!(registry.dispose_all(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_after_dispose_releases_immediately() {
        let registry = DisposableRegistry::new();
        registry.dispose_all();

        let (count, release) = counter();
        assert!(matches!(registry.add("late", release), Err(ChannelError::Cancelled)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
