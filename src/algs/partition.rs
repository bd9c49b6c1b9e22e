//! Balanced contiguous element ranges for root-driven distribution.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Elements per rank: the first `n % p` ranks take one extra element.
///
/// Returns an empty vector when `n_parts == 0`.
pub fn partition_counts(n_elements: usize, n_parts: usize) -> Vec<usize> {
    if n_parts == 0 {
        return Vec::new();
    }
    let base = n_elements / n_parts;
    let remainder = n_elements % n_parts;
    (0..n_parts).map(|r| base + usize::from(r < remainder)).collect()
}

/// Contiguous, non-overlapping ranges over the global element order.
pub fn partition_ranges(n_elements: usize, n_parts: usize) -> Vec<Range<usize>> {
    let mut start = 0;
    partition_counts(n_elements, n_parts)
        .into_iter()
        .map(|count| {
            let range = start..start + count;
            start += count;
            range
        })
        .collect()
}

/// First global element owned by `rank` (closed form of the running sum).
pub fn partition_start(n_elements: usize, n_parts: usize, rank: usize) -> usize {
    let base = n_elements / n_parts;
    let remainder = n_elements % n_parts;
    if rank < remainder {
        (base + 1) * rank
    } else {
        (base + 1) * remainder + base * (rank - remainder)
    }
}

/// Summary of a partition, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub n_elements: usize,
    pub n_parts: usize,
    pub min: usize,
    pub max: usize,
}

impl PartitionStats {
    pub fn of(n_elements: usize, n_parts: usize) -> Self {
        let counts = partition_counts(n_elements, n_parts);
        Self {
            n_elements,
            n_parts,
            min: counts.iter().copied().min().unwrap_or(0),
            max: counts.iter().copied().max().unwrap_or(0),
        }
    }

    /// Largest difference between any two ranks' element counts.
    pub fn imbalance(&self) -> usize {
        self.max - self.min
    }
}
