//! Per-key debounce.
//!
//! [`Debouncer::notify`] arms a timer for a key; a later notify for the same
//! key before it fires replaces it. A burst of notifications therefore
//! produces one callback, `delay` after the last one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct Debouncer<K> {
    delay: Duration,
    state: Arc<Mutex<DebounceState<K>>>,
    callback: Arc<dyn Fn(K) + Send + Sync>,
}

struct DebounceState<K> {
    next_generation: u64,
    timers: HashMap<K, Pending>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration, callback: impl Fn(K) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState {
                next_generation: 0,
                timers: HashMap::new(),
            })),
            callback: Arc::new(callback),
        }
    }

    /// Must be called from inside a tokio runtime.
    pub fn notify(&self, key: K) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.next_generation += 1;
        let generation = state.next_generation;

        let delay = self.delay;
        let shared = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        let fire_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A replaced timer that already woke must not fire.
            let current = {
                let mut state = shared.lock().unwrap_or_else(|p| p.into_inner());
                match state.timers.get(&fire_key) {
                    Some(p) if p.generation == generation => {
                        state.timers.remove(&fire_key);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                callback(fire_key);
            }
        });

        if let Some(prev) = state.timers.insert(key, Pending { generation, handle }) {
            prev.handle.abort();
        }
    }

    /// Keys with an armed timer.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.timers.len()).unwrap_or(0)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            for (_, p) in state.timers.drain() {
                p.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    fn recorder() -> (Arc<Mutex<Vec<(String, Instant)>>>, impl Fn(String) + Send + Sync) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        (fired, move |k: String| {
            sink.lock().unwrap().push((k, Instant::now()));
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_last_notify() {
        let (fired, cb) = recorder();
        let d = Debouncer::new(Duration::from_millis(750), cb);
        let start = Instant::now();
        for _ in 0..5 {
            d.notify("apps/web".to_string());
            sleep(Duration::from_millis(200)).await;
        }
        // Last notify happened at +800ms.
        sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());

        sleep(Duration::from_millis(100)).await;
        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "apps/web");
        assert_eq!(fired[0].1 - start, Duration::from_millis(1550));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let d = Debouncer::new(Duration::from_millis(100), move |_k: &'static str| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        d.notify("a");
        d.notify("b");
        d.notify("a");
        assert_eq!(d.pending(), 2);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(d.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (fired, cb) = recorder();
        let d = Debouncer::new(Duration::from_millis(100), cb);
        d.notify("x".to_string());
        sleep(Duration::from_millis(150)).await;
        d.notify("x".to_string());
        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.lock().unwrap().len(), 2);
    }
}
