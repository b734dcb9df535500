//! Per-client rate limiting with fixed-window counters.
//!
//! Each client gets one counting window. The first admission after a window
//! expires resets it; a background sweeper evicts entries for clients that
//! have gone quiet so the map does not grow without bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One client's window state.
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
    /// Set on every denial; observability only, never part of the decision.
    last_denied: Option<Instant>,
}

/// In-memory per-client rate limiter with fixed-window counters.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    /// Create a new rate limiter admitting `limit` connections per `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is admitted, `false` if rate-limited.
    ///
    /// A denial does not advance the window counter; only the last-denied
    /// timestamp is recorded.
    pub fn admit(&self, client_id: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let entry = entries
            .entry(client_id.to_string())
            .or_insert(WindowEntry {
                count: 0,
                window_start: now,
                last_denied: None,
            });

        if now.saturating_duration_since(entry.window_start) >= self.window {
            // Window expired, start a fresh one.
            entry.count = 1;
            entry.window_start = now;
            true
        } else if entry.count < self.limit {
            entry.count += 1;
            true
        } else {
            entry.last_denied = Some(now);
            false
        }
    }

    /// Remove entries whose window expired before `now`. Returns the number
    /// of evicted entries.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.window;
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.window_start) <= window);
        before - entries.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.entries.lock().expect("rate limiter mutex poisoned").len()
    }

    /// Spawn the background sweeper. The returned handle stops it
    /// cooperatively; the task exits before its next scheduled tick.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep(Instant::now());
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                tracked = limiter.tracked_clients(),
                                "Swept expired rate limiter entries"
                            );
                        }
                    }
                }
            }
            tracing::debug!("Rate limiter sweeper stopped");
        });

        SweeperHandle { stop_tx, task }
    }
}

/// Handle for the background sweeper task.
pub struct SweeperHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_boundary() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let base = Instant::now();

        assert!(limiter.admit("c1", base));
        assert!(limiter.admit("c1", base + Duration::from_millis(200)));
        assert!(limiter.admit("c1", base + Duration::from_millis(400)));

        // Limit reached inside the window.
        assert!(!limiter.admit("c1", base + Duration::from_millis(500)));

        // First admit after expiry resets the window.
        assert!(limiter.admit("c1", base + Duration::from_millis(1050)));
    }

    #[test]
    fn test_denial_does_not_advance_counter() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let base = Instant::now();

        assert!(limiter.admit("c1", base));
        assert!(limiter.admit("c1", base + Duration::from_millis(100)));
        for i in 0..5 {
            assert!(!limiter.admit("c1", base + Duration::from_millis(200 + i * 10)));
        }

        let entries = limiter.entries.lock().unwrap();
        let entry = entries.get("c1").unwrap();
        assert_eq!(entry.count, 2);
        assert!(entry.last_denied.is_some());
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let base = Instant::now();

        assert!(limiter.admit("c1", base));
        assert!(!limiter.admit("c1", base + Duration::from_millis(10)));
        assert!(limiter.admit("c2", base + Duration::from_millis(10)));
    }

    #[test]
    fn test_sweep_evicts_expired_windows() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let base = Instant::now();

        limiter.admit("stale", base);
        limiter.admit("fresh", base + Duration::from_secs(2));

        let evicted = limiter.sweep(base + Duration::from_millis(2100));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.entries.lock().unwrap().contains_key("fresh"));
    }

    #[test]
    fn test_sweep_keeps_live_windows() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let base = Instant::now();

        limiter.admit("c1", base);
        assert_eq!(limiter.sweep(base + Duration::from_millis(900)), 0);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_idle_entries() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_millis(50)));
        limiter.admit("c1", Instant::now());
        assert_eq!(limiter.tracked_clients(), 1);

        let sweeper = limiter.start_sweeper(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(limiter.tracked_clients(), 0);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_stops_before_next_tick() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1)));
        let sweeper = limiter.start_sweeper(Duration::from_secs(60));

        // Stopping must not wait out the 60s interval.
        tokio::time::timeout(Duration::from_secs(1), sweeper.stop())
            .await
            .expect("sweeper did not stop promptly");
    }
}
