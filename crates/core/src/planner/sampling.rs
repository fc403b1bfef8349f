//! Downsampling primitives
//!
//! Quotas are split across cells in proportion to demand, then each cell is
//! cut to its quota by one of the configured policies. Both policies are
//! deterministic: reservoir sampling draws from a seed derived from the cell
//! and frame, priority sampling orders by FRP with ids breaking ties.

use crate::core_types::FireEvent;
use crate::index::CellKey;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Split `cap` across cells proportionally to `demands`.
///
/// Every quota is at most its demand and the quotas sum to
/// `min(cap, sum(demands))`. Remainders go to the largest fractional shares,
/// earlier cells winning ties.
#[must_use]
pub fn allocate_quotas(demands: &[usize], cap: usize) -> Vec<usize> {
    let total: u128 = demands.iter().map(|&d| d as u128).sum();
    if total <= cap as u128 {
        return demands.to_vec();
    }

    let cap_wide = cap as u128;
    let mut quotas = Vec::with_capacity(demands.len());
    let mut remainders = Vec::with_capacity(demands.len());
    let mut assigned: u128 = 0;

    for (i, &demand) in demands.iter().enumerate() {
        let scaled = demand as u128 * cap_wide;
        let quota = scaled / total;
        quotas.push(quota as usize);
        remainders.push((scaled % total, i));
        assigned += quota;
    }

    let leftover = (cap_wide - assigned) as usize;
    remainders.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(leftover) {
        quotas[i] += 1;
    }
    quotas
}

/// Seed for one cell in one frame
#[must_use]
pub fn cell_seed(frame_seed: u64, key: CellKey) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(frame_seed);
    hasher.write_u64(key.packed());
    hasher.finish()
}

/// Mix a base seed with a frame number
#[must_use]
pub fn frame_seed(base: u64, frame: i64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(base);
    hasher.write_i64(frame);
    hasher.finish()
}

/// Keep a uniform random subset of `k` candidates, preserving their order.
pub fn reservoir(candidates: &mut Vec<u32>, k: usize, seed: u64) {
    if candidates.len() <= k {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, candidates.len(), k).into_vec();
    picked.sort_unstable();
    let kept: Vec<u32> = picked.into_iter().map(|i| candidates[i]).collect();
    *candidates = kept;
}

/// Keep the `k` candidates with the highest FRP, ties by lower id, then
/// restore store order.
pub fn priority(candidates: &mut Vec<u32>, k: usize, events: &[FireEvent]) {
    if candidates.len() <= k {
        return;
    }
    if k == 0 {
        candidates.clear();
        return;
    }
    let rank = |a: &u32, b: &u32| {
        let ea = &events[*a as usize];
        let eb = &events[*b as usize];
        eb.frp.total_cmp(&ea.frp).then(ea.id.cmp(&eb.id))
    };
    candidates.select_nth_unstable_by(k - 1, rank);
    candidates.truncate(k);
    candidates.sort_unstable();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Confidence, EventId, SatelliteSource};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_allocate_under_cap_keeps_demand() {
        assert_eq!(allocate_quotas(&[3, 0, 7], 100), vec![3, 0, 7]);
    }

    #[test]
    fn test_allocate_over_cap_sums_to_cap() {
        let quotas = allocate_quotas(&[600_000, 10, 300], 1000);
        assert_eq!(quotas.iter().sum::<usize>(), 1000);
        assert!(quotas[1] <= 10);
        assert!(quotas[0] > quotas[2]);

        let even = allocate_quotas(&[1, 1, 1], 2);
        assert_eq!(even, vec![1, 1, 0]);
    }

    #[test]
    fn test_reservoir_is_seeded() {
        let all: Vec<u32> = (0..10_000).collect();

        let mut a = all.clone();
        let mut b = all.clone();
        let mut c = all.clone();
        reservoir(&mut a, 50, 7);
        reservoir(&mut b, 50, 7);
        reservoir(&mut c, 50, 8);

        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_priority_keeps_brightest() {
        let t = Utc.with_ymd_and_hms(2020, 8, 20, 0, 0, 0).unwrap();
        let frps = [5.0, 90.0, 1.0, 90.0, 40.0];
        let events: Vec<FireEvent> = frps
            .iter()
            .enumerate()
            .map(|(i, &frp)| FireEvent {
                id: EventId(i as u64),
                latitude: 38.0,
                longitude: -121.0,
                timestamp: t,
                brightness: 350.0,
                frp,
                confidence: Confidence::High,
                satellite: SatelliteSource::Noaa20,
                pixel: None,
            })
            .collect();

        let mut candidates: Vec<u32> = (0..5).collect();
        priority(&mut candidates, 3, &events);
        assert_eq!(candidates, vec![1, 3, 4]);

        let mut tie: Vec<u32> = vec![3, 1];
        priority(&mut tie, 1, &events);
        assert_eq!(tie, vec![1]);
    }

    #[test]
    fn test_seeds_differ_per_cell_and_frame() {
        let a = CellKey { row: 1, col: 2 };
        let b = CellKey { row: 2, col: 1 };
        assert_ne!(cell_seed(9, a), cell_seed(9, b));
        assert_ne!(frame_seed(9, 1), frame_seed(9, 2));
        assert_eq!(cell_seed(frame_seed(9, 1), a), cell_seed(frame_seed(9, 1), a));
    }
}
