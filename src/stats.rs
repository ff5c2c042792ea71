use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Default window after which a visitor is considered gone.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Concurrent map of anonymised visitor ids to last-seen instants (pod
/// local). Owned by app state and passed around explicitly; the sweep is an
/// explicit call driven by a task, not a background side effect of reads.
#[derive(Clone)]
pub struct VisitorStats {
    store: Arc<DashMap<String, Instant>>,
    window: Duration,
}

impl VisitorStats {
    pub fn new(window: Duration) -> Self {
        Self { store: Arc::new(DashMap::new()), window }
    }

    /// Registers a hit, keyed by a hash of ip + user agent so distinct
    /// browser sessions behind one NAT still count separately. Obvious bots
    /// are ignored.
    pub fn register_hit(&self, ip: &str, user_agent: &str) {
        if user_agent.contains("bot") {
            return;
        }
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(user_agent.as_bytes());
        let id = URL_SAFE.encode(hasher.finalize());
        self.store.insert(id, Instant::now());
    }

    /// Count of visitors seen within the window.
    pub fn user_count(&self) -> usize {
        let now = Instant::now();
        self.store
            .iter()
            .filter(|e| now.duration_since(*e.value()) < self.window)
            .count()
    }

    /// Drops entries older than the window. Called from the purge task.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.store
            .retain(|_, last| now.duration_since(*last) < self.window);
    }
}

impl Default for VisitorStats {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_distinct_visitors() {
        let stats = VisitorStats::new(Duration::from_secs(60));
        stats.register_hit("1.2.3.4", "Mozilla/5.0");
        stats.register_hit("1.2.3.4", "Mozilla/5.0"); // same session
        stats.register_hit("1.2.3.4", "OtherAgent/1.0"); // same ip, new agent
        stats.register_hit("5.6.7.8", "Mozilla/5.0");
        assert_eq!(stats.user_count(), 3);
    }

    #[test]
    fn ignores_bots() {
        let stats = VisitorStats::new(Duration::from_secs(60));
        stats.register_hit("1.2.3.4", "Googlebot/2.1");
        assert_eq!(stats.user_count(), 0);
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let stats = VisitorStats::new(Duration::from_millis(10));
        stats.register_hit("1.2.3.4", "Mozilla/5.0");
        std::thread::sleep(Duration::from_millis(20));
        stats.sweep();
        assert_eq!(stats.user_count(), 0);
    }
}
