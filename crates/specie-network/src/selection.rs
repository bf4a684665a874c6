//! The witness lottery: reputation-weighted draws for 70% of the
//! committee, a uniform shuffle for the remaining 30%.
//!
//! The weighted phase makes high-reputation witnesses preferred but never
//! guaranteed; the random share keeps selection from centralizing on a
//! fixed clique.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use specie_core::types::constants::LOTTERY_REPUTATION_SHARE;

/// Draw up to `count` witness ids from `scores`, skipping `exclude`.
///
/// If the eligible pool is no larger than `count` the whole pool is
/// returned. Otherwise `⌈0.7·count⌉` draws are score-proportional without
/// replacement and the rest come from a uniform shuffle of the remainder.
pub fn select_witnesses<R: Rng>(
    rng: &mut R,
    scores: &[(usize, f64)],
    count: usize,
    exclude: &HashSet<usize>,
) -> Vec<usize> {
    let mut pool: Vec<(usize, f64)> = scores
        .iter()
        .filter(|(id, _)| !exclude.contains(id))
        .cloned()
        .collect();

    if pool.len() <= count {
        return pool.into_iter().map(|(id, _)| id).collect();
    }

    let rep_based = ((count as f64) * LOTTERY_REPUTATION_SHARE).ceil() as usize;
    let random = count - rep_based;
    let mut picked = Vec::with_capacity(count);

    for _ in 0..rep_based {
        let total: f64 = pool.iter().map(|(_, s)| s.max(0.0)).sum();
        let index = if total <= f64::EPSILON {
            // Everyone is at zero: fall back to a uniform draw.
            rng.gen_range(0..pool.len())
        } else {
            let mut draw = rng.gen_range(0.0..total);
            let mut chosen = pool.len() - 1;
            for (i, (_, score)) in pool.iter().enumerate() {
                let weight = score.max(0.0);
                if draw < weight {
                    chosen = i;
                    break;
                }
                draw -= weight;
            }
            chosen
        };
        picked.push(pool.remove(index).0);
    }

    pool.shuffle(rng);
    picked.extend(pool.into_iter().take(random).map(|(id, _)| id));
    picked
}
