// Numeric helpers shared by the recommenders and metrics

use crate::models::ScoredItem;
use std::cmp::Ordering;

/// Clamp a prediction into the rating range `[0, max]`
pub fn clamp_score(score: f32, max: f32) -> f32 {
    score.clamp(0.0, max)
}

/// DCG discount for a 0-indexed rank: log2(rank + 2)
pub fn rank_discount(rank: usize) -> f64 {
    ((rank + 2) as f64).log2()
}

/// Higher score first, then lower item id
pub fn by_score_desc(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.item_id.cmp(&b.item_id))
}
