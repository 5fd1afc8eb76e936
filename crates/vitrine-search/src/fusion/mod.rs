//! Rank fusion of independently ranked candidate lists.

pub mod rrf;

pub use rrf::{DEFAULT_RRF_K, FusedCandidate, FusedRanking, fuse};
