//! Per-client sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Admits at most `max_requests` per client within any trailing `window`.
///
/// Admission at `T` depends only on admitted requests in `(T - window, T]`.
/// Rejected calls are not recorded, so a client hammering the limiter does not
/// push its own window forward.
pub struct RateLimiter {
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_allowed(&self, client_id: &str) -> bool {
        self.is_allowed_at(client_id, Instant::now())
    }

    /// Prune, count and record in one critical section.
    pub fn is_allowed_at(&self, client_id: &str, now: Instant) -> bool {
        let mut clients = self.lock();
        let timestamps = clients.entry(client_id.to_string()).or_default();
        prune(timestamps, now, self.window);
        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of clients currently tracked.
    pub fn active_clients(&self) -> usize {
        self.lock().len()
    }

    /// Drops clients with no request left inside the window.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before - clients.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Concurrent callers may record slightly out of order, so prune by value
// rather than popping from the front.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    timestamps.retain(|&t| now.saturating_duration_since(t) < window);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn third_call_within_window_is_rejected() {
        let limiter = RateLimiter::new(2, WINDOW);
        let t0 = Instant::now();
        let results: Vec<bool> = (0..3u64)
            .map(|i| limiter.is_allowed_at("x", t0 + Duration::from_millis(i * 300)))
            .collect();
        assert_eq!(results, vec![true, true, false]);
    }

    #[test]
    fn window_slides_per_request() {
        let limiter = RateLimiter::new(2, WINDOW);
        let t0 = Instant::now();
        let eps = Duration::from_millis(1);
        assert!(limiter.is_allowed_at("x", t0));
        assert!(limiter.is_allowed_at("x", t0));

        assert!(!limiter.is_allowed_at("x", t0 + WINDOW - eps));
        assert!(limiter.is_allowed_at("x", t0 + WINDOW + eps));
    }

    #[test]
    fn sliding_not_fixed_bucket() {
        let limiter = RateLimiter::new(2, WINDOW);
        let t0 = Instant::now();
        assert!(limiter.is_allowed_at("x", t0));
        assert!(limiter.is_allowed_at("x", t0 + Duration::from_secs(40)));
        // First request has left the window, second has not.
        assert!(limiter.is_allowed_at("x", t0 + Duration::from_secs(61)));
        assert!(!limiter.is_allowed_at("x", t0 + Duration::from_secs(62)));
        assert!(limiter.is_allowed_at("x", t0 + Duration::from_secs(101)));
    }

    #[test]
    fn rejected_calls_are_not_recorded() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();
        assert!(limiter.is_allowed_at("x", t0));
        for s in 1..60 {
            assert!(!limiter.is_allowed_at("x", t0 + Duration::from_secs(s)));
        }
        assert!(limiter.is_allowed_at("x", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();
        assert!(limiter.is_allowed_at("a", t0));
        assert!(!limiter.is_allowed_at("a", t0));
        assert!(limiter.is_allowed_at("b", t0));
        assert_eq!(limiter.active_clients(), 2);
    }

    #[test]
    fn evict_idle_drops_only_quiet_clients() {
        let limiter = RateLimiter::new(5, WINDOW);
        let t0 = Instant::now();
        limiter.is_allowed_at("quiet", t0);
        limiter.is_allowed_at("busy", t0 + Duration::from_secs(50));

        assert_eq!(limiter.evict_idle_at(t0 + Duration::from_secs(70)), 1);
        assert_eq!(limiter.active_clients(), 1);
        assert_eq!(limiter.evict_idle_at(t0 + Duration::from_secs(70)), 0);
    }

    #[test]
    fn concurrent_callers_never_over_admit() {
        let limiter = Arc::new(RateLimiter::new(25, WINDOW));
        let admitted = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    if limiter.is_allowed("shared") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 25);
    }
}
