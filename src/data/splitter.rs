// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles images and splits them into two sets:
//   - Training set:   captions become training shards
//   - Validation set: captions become evaluation shards
//
// The split happens at image level, before captions are broken
// out, so no image contributes to both sets.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation

use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffle `items` with `rng` and split into (train, validation).
///
/// # Arguments
/// * `items`          - All available items (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.9 = 90%
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut items:      Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    items.shuffle(rng);

    let total    = items.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = split_at.min(total);

    // After this: items = [0..split_at], val = [split_at..total]
    let val = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        items.len(),
        val.len(),
    );

    (items, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_correct_split_sizes() {
        let mut rng       = StdRng::seed_from_u64(1);
        let items: Vec<usize> = (0..100).collect();
        let (train, val)  = split_train_val(items, 0.8, &mut rng);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let mut rng       = StdRng::seed_from_u64(2);
        let items: Vec<usize> = (0..50).collect();
        let (train, val)  = split_train_val(items, 0.7, &mut rng);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let items: Vec<usize> = (0..30).collect();
        let a = split_train_val(items.clone(), 0.5, &mut StdRng::seed_from_u64(12345));
        let b = split_train_val(items,         0.5, &mut StdRng::seed_from_u64(12345));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let mut rng      = StdRng::seed_from_u64(3);
        let (train, val) = split_train_val(Vec::<usize>::new(), 0.8, &mut rng);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
