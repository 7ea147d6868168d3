//! Message id generation.
//!
//! `msg_id = floor(unix_nanos / 1e6) * 100 + rand(0..99)`, matching the
//! original's seq-id generator (`service/sender.go` `generateSeqIDList`,
//! `util/util.go`). Uses `rand` the way `foundation/gax`'s `Cargo.toml`
//! already depends on it for jittered retry delays.

use rand::Rng;

/// Generates a single message id, unique with high probability within one
/// process even under a tight generation loop (see `property::msg_id`
/// tests).
pub fn generate_msg_id() -> i64 {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let millis = nanos / 1_000_000;
    let jitter: i64 = rand::rng().random_range(0..99);
    millis * 100 + jitter
}

/// Generates `n` message ids in a single contiguous draw. Not guaranteed
/// distinct by construction — callers drawing at very high rates should
/// still watch for collisions, per spec §8.6.
pub fn generate_msg_ids(n: usize) -> Vec<i64> {
    (0..n).map(|_| generate_msg_id()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_in_a_batch_are_distinct_with_high_probability() {
        let ids = generate_msg_ids(1000);
        let unique: HashSet<_> = ids.iter().collect();
        // Allow a vanishingly small number of collisions rather than
        // asserting perfection; see spec §8 property 6.
        assert!(unique.len() >= ids.len() - 1, "too many collisions: {} of {}", ids.len() - unique.len(), ids.len());
    }

    #[test]
    fn concurrent_generators_stay_distinct() {
        use std::thread;

        let handles: Vec<_> = (0..16)
            .map(|_| thread::spawn(|| generate_msg_ids(200)))
            .collect();
        let mut all = HashSet::new();
        let mut total = 0;
        for h in handles {
            for id in h.join().unwrap() {
                all.insert(id);
                total += 1;
            }
        }
        assert!(all.len() as f64 >= total as f64 * 0.999);
    }
}
