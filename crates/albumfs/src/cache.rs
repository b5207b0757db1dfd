//! Compute-once, memoize, invalidate.
//!
//! [`Cached`] backs every lazily loaded value in the model: the album map,
//! each album's photo map and each photo's image bytes. A load that fails
//! leaves the slot empty, so the next access tries again.

use std::future::Future;
use tokio::sync::Mutex;

use crate::error::Result;

#[derive(Debug)]
pub struct Cached<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Cached<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Slot that starts out loaded.
    pub fn with_value(value: T) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }
}

impl<T: Clone> Cached<T> {
    /// Return the memoized value, running `load` if the slot is empty.
    ///
    /// The slot's lock is held across `load`, so concurrent callers wait for
    /// the first load instead of issuing their own.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = load().await?;
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Apply `f` to the value if loaded. Returns whether it ran.
    pub async fn update_if_loaded(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.as_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// The value if loaded, without triggering a load.
    pub async fn peek(&self) -> Option<T> {
        self.slot.lock().await.clone()
    }

    /// Drop the memoized value.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loads_once() {
        let cached = Cached::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cached
                .get_or_load(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_memoized() {
        let cached: Cached<u32> = Cached::new();
        let err = cached
            .get_or_load(|| async { Err(Error::TransportFailure("down".into())) })
            .await;
        assert!(err.is_err());
        assert!(!cached.is_loaded().await);

        let v = cached.get_or_load(|| async { Ok(1) }).await.unwrap();
        assert_eq!(v, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cached = Cached::with_value(1);
        cached.invalidate().await;
        let v = cached.get_or_load(|| async { Ok(2) }).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn test_update_if_loaded() {
        let cached: Cached<Vec<u8>> = Cached::new();
        assert!(!cached.update_if_loaded(|v| v.push(1)).await);
        assert_eq!(cached.peek().await, None);

        cached.get_or_load(|| async { Ok(vec![0]) }).await.unwrap();
        assert!(cached.update_if_loaded(|v| v.push(1)).await);
        assert_eq!(cached.peek().await, Some(vec![0, 1]));
    }
}
