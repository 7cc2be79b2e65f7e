//! Nearest-time matching of partial records
//!
//! Log files and peak batches are written by different programs at slightly
//! different times. A run exists only once one of each has been paired, so the
//! processors pair them here by timestamp before creating the run row.
//!
//! Matching is greedy: secondary records are visited in the order supplied and
//! each takes the closest primary record still unmatched. This is not a
//! minimum-cost assignment; two secondaries competing for one primary resolve
//! in favour of whichever is visited first, even if the second is closer.

use chrono::{Duration, NaiveDateTime};

/// Anything that can be placed on the instrument timeline.
pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;
}

impl Timestamped for NaiveDateTime {
    fn timestamp(&self) -> NaiveDateTime {
        *self
    }
}

/// A matched pair, as indices into the slices given to [`match_nearest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPair {
    pub primary: usize,
    pub secondary: usize,
    /// Absolute distance between the two timestamps.
    pub delta: Duration,
}

/// Pair each secondary record with its nearest unmatched primary record.
///
/// A candidate is accepted when `|Δt| <= tolerance`. Ties on distance go to
/// the primary with the lower index. Every index appears in at most one pair.
pub fn match_nearest<P, S>(primary: &[P], secondary: &[S], tolerance: Duration) -> Vec<MatchPair>
where
    P: Timestamped,
    S: Timestamped,
{
    let mut taken = vec![false; primary.len()];
    let mut pairs = Vec::new();

    for (s_idx, record) in secondary.iter().enumerate() {
        let when = record.timestamp();

        let nearest = primary
            .iter()
            .enumerate()
            .filter(|(p_idx, _)| !taken[*p_idx])
            .map(|(p_idx, candidate)| (p_idx, (candidate.timestamp() - when).abs()))
            .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        if let Some((p_idx, delta)) = nearest {
            if delta <= tolerance {
                taken[p_idx] = true;
                pairs.push(MatchPair {
                    primary: p_idx,
                    secondary: s_idx,
                    delta,
                });
            }
        }
    }

    pairs
}

/// Halfway point between two instants, independent of argument order.
pub fn midpoint(a: NaiveDateTime, b: NaiveDateTime) -> NaiveDateTime {
    a + (b - a) / 2
}
