//! Reciprocal Rank Fusion (RRF).
//!
//! Each input list contributes `1 / (k + rank)` to every id it contains,
//! with `rank` 1-indexed. Ranks are fused rather than raw scores because the
//! vector and lexical backends score on unrelated scales.
//!
//! ```text
//! score(id) = sum over lists containing id of 1 / (k + rank_in_list)
//! ```
//!
//! Ordering rules:
//! - descending fused score
//! - exact ties keep first-seen order (list order, then position)
//! - an id repeated inside one list counts once, at its best position
//!
//! Each id's contributions are summed smallest-first, so the same multiset of
//! ranks always yields a bit-identical score regardless of list order.
//!
//! # Example
//!
//! ```
//! use vitrine_core::RecordId;
//! use vitrine_search::fusion::fuse;
//!
//! let vector: Vec<RecordId> = ["p1", "p2", "p3"].into_iter().map(RecordId::from).collect();
//! let lexical: Vec<RecordId> = ["p3", "p1"].into_iter().map(RecordId::from).collect();
//! let fused = fuse(&[vector, lexical], 60);
//! let ids: Vec<&str> = fused.iter().map(|c| c.record_id.as_str()).collect();
//! assert_eq!(ids, vec!["p1", "p3", "p2"]);
//! ```

use serde::Serialize;
use std::collections::HashMap;
use vitrine_core::RecordId;

/// Default RRF constant.
pub const DEFAULT_RRF_K: usize = 60;

/// One fused entry with its per-list rank breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedCandidate {
    pub record_id: RecordId,
    /// Fused RRF score; higher is better.
    pub score: f64,
    /// 1-indexed rank in each input list, in input order; `None` if absent.
    pub ranks: Vec<Option<usize>>,
}

/// Fused ordering of record ids, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FusedRanking {
    entries: Vec<FusedCandidate>,
}

impl FusedRanking {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FusedCandidate> {
        self.entries.iter()
    }

    /// Keep only the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Ordered record ids, best first.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.entries.iter().map(|c| c.record_id.clone()).collect()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<FusedCandidate> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a FusedRanking {
    type Item = &'a FusedCandidate;
    type IntoIter = std::slice::Iter<'a, FusedCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

struct Accumulator {
    record_id: RecordId,
    contributions: Vec<f64>,
    ranks: Vec<Option<usize>>,
}

/// Fuse any number of ranked lists with RRF constant `k`.
///
/// Empty input, or input made only of empty lists, yields an empty ranking.
#[must_use]
pub fn fuse<L: AsRef<[RecordId]>>(lists: &[L], k: usize) -> FusedRanking {
    let mut slots: HashMap<&RecordId, usize> = HashMap::new();
    let mut acc: Vec<Accumulator> = Vec::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (pos, id) in list.as_ref().iter().enumerate() {
            let slot = *slots.entry(id).or_insert_with(|| {
                acc.push(Accumulator {
                    record_id: id.clone(),
                    contributions: Vec::new(),
                    ranks: vec![None; lists.len()],
                });
                acc.len() - 1
            });

            let entry = &mut acc[slot];
            if entry.ranks[list_idx].is_some() {
                continue;
            }
            let rank = pos + 1;
            entry.ranks[list_idx] = Some(rank);
            entry.contributions.push(contribution(k, rank));
        }
    }

    let mut entries: Vec<FusedCandidate> = acc
        .into_iter()
        .map(|mut a| {
            a.contributions.sort_by(f64::total_cmp);
            FusedCandidate {
                record_id: a.record_id,
                score: a.contributions.iter().sum(),
                ranks: a.ranks,
            }
        })
        .collect();

    // Stable sort: equal scores keep first-seen order.
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));

    FusedRanking { entries }
}

fn contribution(k: usize, rank: usize) -> f64 {
    let denom = u32::try_from(k.saturating_add(rank)).unwrap_or(u32::MAX);
    1.0 / f64::from(denom)
}
