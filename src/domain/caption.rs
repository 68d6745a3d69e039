// ============================================================
// Layer 3 — Caption Hypotheses
// ============================================================
// A Caption is one hypothesis inside the beam search: the word
// ids emitted so far, the recurrent state after the last word,
// the cumulative log-probability and the score used for ranking.
//
// TopN is a bounded container that keeps the n best-scoring
// items. Items with equal score rank by insertion order, so the
// earlier hypothesis wins a tie and survives pruning.
//
// Reference: Vinyals et al. (2015) Show and Tell, §3.2 (Inference)

use std::cmp::Ordering;

/// Anything the TopN container can rank.
pub trait Scored {
    fn score(&self) -> f64;
}

#[derive(Debug, Clone)]
pub struct Caption<S> {
    /// Word ids, starting with the start word
    pub sentence: Vec<u32>,
    /// Recurrent state after consuming the last word
    pub state:    S,
    /// Sum of log-probabilities of every emitted word
    pub logprob:  f64,
    /// Ranking score (logprob, possibly length-normalized)
    pub score:    f64,
    /// Set once the end word has been emitted or the length cap hit
    pub finished: bool,
}

impl<S> Caption<S> {
    pub fn new(sentence: Vec<u32>, state: S, logprob: f64, score: f64) -> Self {
        Self { sentence, state, logprob, score, finished: false }
    }

    pub fn last_word(&self) -> u32 {
        // Every hypothesis is seeded with the start word
        self.sentence.last().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sentence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentence.is_empty()
    }

    /// Probability of the whole sentence
    pub fn probability(&self) -> f64 {
        self.logprob.exp()
    }
}

impl<S> Scored for Caption<S> {
    fn score(&self) -> f64 {
        self.score
    }
}

// ─── TopN ─────────────────────────────────────────────────────────────────────
#[derive(Debug)]
pub struct TopN<T> {
    n:        usize,
    /// (insertion sequence number, item)
    data:     Vec<(u64, T)>,
    next_seq: u64,
}

impl<T: Scored> TopN<T> {
    pub fn new(n: usize) -> Self {
        Self { n, data: Vec::with_capacity(n), next_seq: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Insert an item, evicting the current worst when full. A new
    /// item only evicts when strictly better than the worst one.
    pub fn push(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.data.len() < self.n {
            self.data.push((seq, item));
            return;
        }

        let Some(worst) = self.worst_index() else {
            return;
        };
        if item.score() > self.data[worst].1.score() {
            self.data[worst] = (seq, item);
        }
    }

    /// Remove and return every item. When `sort` is set, items are
    /// ordered best first (ties by insertion order).
    pub fn extract(&mut self, sort: bool) -> Vec<T> {
        let mut data = std::mem::take(&mut self.data);
        if sort {
            data.sort_by(|a, b| rank(a, b));
        }
        data.into_iter().map(|(_, item)| item).collect()
    }

    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Lowest score; among equals the most recently inserted
    fn worst_index(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| rank(a, b))
            .map(|(i, _)| i)
    }
}

/// Ordering where "less" means "ranks higher"
fn rank<T: Scored>(a: &(u64, T), b: &(u64, T)) -> Ordering {
    b.1.score()
        .total_cmp(&a.1.score())
        .then_with(|| a.0.cmp(&b.0))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn cap(id: u32, score: f64) -> Caption<()> {
        Caption::new(vec![id], (), score, score)
    }

    fn ids(caps: &[Caption<()>]) -> Vec<u32> {
        caps.iter().map(|c| c.sentence[0]).collect()
    }

    #[test]
    fn test_keeps_best_n() {
        let mut top = TopN::new(2);
        top.push(cap(1, -3.0));
        top.push(cap(2, -1.0));
        top.push(cap(3, -2.0));
        assert_eq!(ids(&top.extract(true)), vec![2, 3]);
    }

    #[test]
    fn test_ties_keep_earlier_insertion() {
        let mut top = TopN::new(2);
        top.push(cap(1, -1.0));
        top.push(cap(2, -1.0));
        top.push(cap(3, -1.0));
        assert_eq!(ids(&top.extract(true)), vec![1, 2]);
    }

    #[test]
    fn test_tie_evicts_latest_of_equal_worst() {
        let mut top = TopN::new(2);
        top.push(cap(1, -2.0));
        top.push(cap(2, -2.0));
        top.push(cap(3, -1.0));
        assert_eq!(ids(&top.extract(true)), vec![3, 1]);
    }

    #[test]
    fn test_extract_empties_container() {
        let mut top = TopN::new(3);
        top.push(cap(1, 0.0));
        assert_eq!(top.extract(false).len(), 1);
        assert!(top.is_empty());
    }

    #[test]
    fn test_probability_is_exp_logprob() {
        let c = Caption::new(vec![0], (), (0.25f64).ln(), 0.0);
        assert!((c.probability() - 0.25).abs() < 1e-12);
    }
}
