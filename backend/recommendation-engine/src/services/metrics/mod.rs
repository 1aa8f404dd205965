//! Ranking quality: DCG, IDCG and NDCG.
//!
//! Gains use the exponential form `2^rating - 1` and the discount
//! `log2(rank + 2)` for 0-indexed ranks.

use crate::error::{DegenerateInput, EngineError, Result};
use crate::models::{ItemId, ItemScores};
use crate::utils::rank_discount;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::error;

fn gain(rating: f32) -> f64 {
    2f64.powf(f64::from(rating)) - 1.0
}

/// Discounted cumulative gain of `ranked`, scored with the held-out ratings.
///
/// Every ranked item must have a held-out rating.
pub fn dcg(held_out: &ItemScores, ranked: &[ItemId]) -> Result<f64> {
    let mut total = 0.0;
    for (rank, item_id) in ranked.iter().enumerate() {
        let rating = held_out.get(item_id).ok_or_else(|| {
            error!(item_id, rank, "Ranked item has no held-out rating");
            EngineError::InvariantViolation(format!(
                "ranked item {} is not part of the held-out set",
                item_id
            ))
        })?;
        total += gain(*rating) / rank_discount(rank);
    }
    Ok(total)
}

/// DCG of the best possible ranking of the same length as `ranked`.
///
/// Held-out items are ordered by rating; ties keep the order `ranked` gave
/// them, and tied items missing from `ranked` go last.
pub fn idcg(held_out: &ItemScores, ranked: &[ItemId]) -> Result<f64> {
    let q = ranked.len();
    if q > held_out.len() {
        error!(
            ranked = q,
            held_out = held_out.len(),
            "Ranking is longer than the held-out set"
        );
        return Err(EngineError::InvariantViolation(format!(
            "ranking of {} items cannot be scored against {} held-out ratings",
            q,
            held_out.len()
        )));
    }

    let position: HashMap<ItemId, usize> = ranked
        .iter()
        .enumerate()
        .map(|(rank, &item_id)| (item_id, rank))
        .collect();

    let mut ideal: Vec<(ItemId, f32)> = held_out.iter().map(|(&id, &r)| (id, r)).collect();
    ideal.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => {
            let pa = position.get(&a.0).copied().unwrap_or(usize::MAX);
            let pb = position.get(&b.0).copied().unwrap_or(usize::MAX);
            pa.cmp(&pb)
        }
        other => other,
    });

    Ok(ideal
        .iter()
        .take(q)
        .enumerate()
        .map(|(rank, &(_, rating))| gain(rating) / rank_discount(rank))
        .sum())
}

/// `dcg / idcg`; a zero IDCG has no meaningful ratio
pub fn ndcg(dcg: f64, idcg: f64) -> Result<f64> {
    if idcg == 0.0 {
        return Err(DegenerateInput::ZeroIdcg.into());
    }
    Ok(dcg / idcg)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingQuality {
    pub dcg: f64,
    pub idcg: f64,
    pub ndcg: f64,
}

impl RankingQuality {
    pub fn compute(held_out: &ItemScores, ranked: &[ItemId]) -> Result<Self> {
        let dcg = dcg(held_out, ranked)?;
        let idcg = idcg(held_out, ranked)?;
        let ndcg = ndcg(dcg, idcg)?;
        Ok(Self { dcg, idcg, ndcg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_out(pairs: &[(ItemId, f32)]) -> ItemScores {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_dcg_formula() {
        let truth = held_out(&[(1, 3.0), (2, 2.0), (3, 1.0)]);

        // 7/1 + 3/log2(3) + 1/2
        let expected = 7.0 + 3.0 / 3f64.log2() + 0.5;
        assert!((dcg(&truth, &[1, 2, 3]).unwrap() - expected).abs() < 1e-9);
        assert_eq!(dcg(&truth, &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_dcg_rejects_items_outside_held_out() {
        let truth = held_out(&[(1, 3.0)]);
        assert!(matches!(
            dcg(&truth, &[1, 9]),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_idcg_uses_best_ordering_of_q_items() {
        let truth = held_out(&[(1, 1.0), (2, 3.0), (3, 2.0)]);

        // Q = 2: ideal picks 2 then 3
        let expected = 7.0 + 3.0 / 3f64.log2();
        assert!((idcg(&truth, &[1, 3]).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_ranking_has_ndcg_one() {
        let truth = held_out(&[(1, 1.0), (2, 3.0), (3, 2.0)]);
        let quality = RankingQuality::compute(&truth, &[2, 3, 1]).unwrap();

        assert!((quality.ndcg - 1.0).abs() < 1e-12);
        assert_eq!(quality.dcg, quality.idcg);
    }

    #[test]
    fn test_worse_ranking_lowers_ndcg() {
        let truth = held_out(&[(1, 1.0), (2, 3.0), (3, 2.0)]);
        let quality = RankingQuality::compute(&truth, &[1, 3, 2]).unwrap();

        assert!(quality.ndcg < 1.0);
        assert!(quality.ndcg > 0.0);
    }

    #[test]
    fn test_idcg_longer_than_held_out() {
        let truth = held_out(&[(1, 1.0)]);
        assert!(matches!(
            idcg(&truth, &[1, 2]),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_zero_idcg_is_degenerate() {
        assert!(matches!(
            ndcg(0.0, 0.0),
            Err(EngineError::Degenerate(DegenerateInput::ZeroIdcg))
        ));

        // all held-out ratings zero -> every gain is zero
        let truth = held_out(&[(1, 0.0), (2, 0.0)]);
        assert!(matches!(
            RankingQuality::compute(&truth, &[1]),
            Err(EngineError::Degenerate(DegenerateInput::ZeroIdcg))
        ));
    }
}
