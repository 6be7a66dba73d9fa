//! Dedup registry: the set of ids claimed for download

use std::sync::Mutex;

use rustc_hash::FxHashSet;

/// Shared set of claimed ids (in flight or completed).
///
/// An id enters the set atomically with the decision to download it. A failed
/// attempt releases it; a successful one keeps it for good, paired with the
/// book appended to [`ResultSet`](crate::ResultSet).
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: Mutex<FxHashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert `id` if absent. False means another worker owns or finished it.
    pub fn try_claim(&self, id: &str) -> bool {
        let mut claimed = self.claimed.lock().expect("registry lock poisoned");
        if claimed.contains(id) {
            return false;
        }
        claimed.insert(id.to_string())
    }

    /// Give up a claim after a failed attempt so the id can be retried
    pub fn release(&self, id: &str) {
        self.claimed
            .lock()
            .expect("registry lock poisoned")
            .remove(id);
    }

    /// Non-claiming membership check (search workers skip known ids with it)
    pub fn contains(&self, id: &str) -> bool {
        self.claimed
            .lock()
            .expect("registry lock poisoned")
            .contains(id)
    }

    /// Pre-seed with ids restored from a previous run
    pub fn seed(&self, ids: impl IntoIterator<Item = String>) {
        self.claimed
            .lock()
            .expect("registry lock poisoned")
            .extend(ids);
    }

    /// Copy of the claimed set
    pub fn contains_snapshot(&self) -> FxHashSet<String> {
        self.claimed.lock().expect("registry lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn claim_is_exclusive() {
        let r = DedupRegistry::new();
        assert!(r.try_claim("OL1W"));
        assert!(!r.try_claim("OL1W"));
        assert!(r.try_claim("OL2W"));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn release_allows_reclaim() {
        let r = DedupRegistry::new();
        assert!(r.try_claim("OL1W"));
        r.release("OL1W");
        assert!(!r.contains("OL1W"));
        assert!(r.try_claim("OL1W"));
    }

    #[test]
    fn release_unknown_is_noop() {
        let r = DedupRegistry::new();
        r.release("missing");
        assert!(r.is_empty());
    }

    #[test]
    fn seeded_ids_cannot_be_claimed() {
        let r = DedupRegistry::new();
        r.seed(vec!["a".to_string(), "b".to_string()]);
        assert!(!r.try_claim("a"));
        assert!(!r.try_claim("b"));
        assert!(r.try_claim("c"));
        let snap = r.contains_snapshot();
        assert_eq!(snap.len(), 3);
        assert!(snap.contains("a"));
    }

    #[test]
    fn concurrent_claims_have_single_winner() {
        let r = Arc::new(DedupRegistry::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (r, wins, barrier) = (r.clone(), wins.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    if r.try_claim("contested") {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
