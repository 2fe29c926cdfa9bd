use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Correlation id source for one client instance.
///
/// Seeded from the wall clock and bumped atomically, so ids keep increasing
/// across reconnects of the same client. Uniqueness is per instance only.
pub struct CallIdGenerator {
    counter: AtomicU64,
}

impl CallIdGenerator {
    pub fn new() -> Self {
        Self::seeded(now_ms())
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Allocate the next id.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocate the next id in its wire form.
    pub fn next_id(&self) -> String {
        self.next().to_string()
    }
}

impl Default for CallIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Idempotency key for a send: `<prefix>-<unix millis>-<correlation id>`.
pub fn idempotency_key(prefix: &str, correlation_id: &str) -> String {
    format!("{}-{}-{}", prefix, now_ms(), correlation_id)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_strictly_increase() {
        let ids = CallIdGenerator::new();
        let allocated: Vec<u64> = (0..1000).map(|_| ids.next()).collect();
        assert!(allocated.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seeded_starts_after_seed() {
        let ids = CallIdGenerator::seeded(41);
        assert_eq!(ids.next_id(), "42");
        assert_eq!(ids.next_id(), "43");
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let ids = CallIdGenerator::new();
        let mut all = Vec::new();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..500).map(|_| ids.next()).collect::<Vec<_>>()))
                .collect();
            for h in handles {
                all.extend(h.join().unwrap());
            }
        });
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), 8 * 500);
    }

    #[test]
    fn test_idempotency_key_shape() {
        let key = idempotency_key("linux", "17");
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "linux");
        assert!(parts[1].parse::<u64>().unwrap() > 0);
        assert_eq!(parts[2], "17");
    }
}
