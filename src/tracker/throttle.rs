//! Single-slot publish throttle.
//!
//! The first value after a quiet period is delivered immediately. Values
//! offered inside the window replace each other in a one-value slot, and the
//! survivor is delivered when the window closes. Deliveries are never closer
//! together than the window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant};

type Sink<T> = Box<dyn Fn(T) + Send + Sync>;

/// Leading + trailing throttle with a one-value slot.
pub struct Throttle<T> {
    inner: Arc<ThrottleInner<T>>,
}

impl<T> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct ThrottleInner<T> {
    window: Duration,
    slot: Mutex<Slot<T>>,
    sink: Sink<T>,
}

struct Slot<T> {
    last_fired: Option<Instant>,
    pending: Option<T>,
    /// Generation of the armed trailing timer, if any.
    armed: Option<u64>,
    next_generation: u64,
}

impl<T: Send + 'static> Throttle<T> {
    /// `sink` runs synchronously for every delivered value.
    pub fn new(window: Duration, sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                window,
                slot: Mutex::new(Slot {
                    last_fired: None,
                    pending: None,
                    armed: None,
                    next_generation: 0,
                }),
                sink: Box::new(sink),
            }),
        }
    }

    /// Offer a value. Must be called within a tokio runtime when a trailing
    /// delivery has to be scheduled.
    pub fn offer(&self, value: T) {
        let mut slot = self.inner.lock();
        let now = Instant::now();
        let ready = slot
            .last_fired
            .map_or(true, |last| now.duration_since(last) >= self.inner.window);

        if ready && slot.armed.is_none() {
            slot.last_fired = Some(now);
            (self.inner.sink)(value);
            return;
        }

        slot.pending = Some(value);
        if slot.armed.is_none() {
            let generation = slot.next_generation;
            slot.next_generation += 1;
            slot.armed = Some(generation);

            let fire_at = slot.last_fired.map_or(now, |last| last + self.inner.window);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                time::sleep_until(fire_at).await;
                inner.fire(generation);
            });
        }
    }

    /// Take the held-back value without delivering it and disarm the
    /// trailing timer. The window keeps counting from the last delivery.
    pub fn take_pending(&self) -> Option<T> {
        let mut slot = self.inner.lock();
        slot.armed = None;
        slot.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}

impl<T> ThrottleInner<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver the pending value if `generation` is still the armed timer.
    fn fire(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.armed != Some(generation) {
            return;
        }
        slot.armed = None;
        if let Some(value) = slot.pending.take() {
            slot.last_fired = Some(Instant::now());
            (self.sink)(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<(u32, Instant)>>>, impl Fn(u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = move |v: u32| sink_seen.lock().unwrap().push((v, Instant::now()));
        (seen, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_then_trailing() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), sink);
        let start = Instant::now();

        throttle.offer(1);
        time::sleep(Duration::from_millis(10)).await;
        throttle.offer(2);
        time::sleep(Duration::from_millis(10)).await;
        throttle.offer(3);
        assert!(throttle.has_pending());

        time::sleep(Duration::from_millis(200)).await;
        let seen = seen.lock().unwrap();
        let values: Vec<u32> = seen.iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![1, 3]);
        assert_eq!(seen[0].1 - start, Duration::ZERO);
        assert_eq!(seen[1].1 - start, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliveries_respect_window() {
        let (seen, sink) = recorder();
        let window = Duration::from_millis(100);
        let throttle = Throttle::new(window, sink);

        for i in 0..20 {
            throttle.offer(i);
            time::sleep(Duration::from_millis(15)).await;
        }
        time::sleep(Duration::from_millis(500)).await;

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 3);
        for pair in seen.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= window);
        }
        assert_eq!(seen.last().unwrap().0, 19);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_is_immediate() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::ZERO, sink);
        throttle.offer(1);
        throttle.offer(2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_pending_skips_delivery_and_disarms_timer() {
        let (seen, sink) = recorder();
        let window = Duration::from_millis(100);
        let throttle = Throttle::new(window, sink);
        let start = Instant::now();

        throttle.offer(1);
        throttle.offer(2);
        assert_eq!(throttle.take_pending(), Some(2));
        assert_eq!(throttle.take_pending(), None);
        assert!(!throttle.has_pending());

        // The disarmed timer must not deliver a later value early.
        time::sleep(Duration::from_millis(50)).await;
        throttle.offer(3);
        time::sleep(Duration::from_millis(10)).await;
        let values: Vec<u32> = seen.lock().unwrap().iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![1]);

        time::sleep(Duration::from_millis(200)).await;
        let seen = seen.lock().unwrap();
        let values: Vec<u32> = seen.iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![1, 3]);
        assert_eq!(seen[1].1 - start, window);
    }
}
