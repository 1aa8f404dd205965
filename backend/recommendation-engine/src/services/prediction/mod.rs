use crate::models::{ItemId, ItemScores, ScoredItem};
use crate::utils::{by_score_desc, clamp_score};
use std::collections::BTreeSet;
use tracing::debug;

/// SlopeOne rating prediction.
///
/// Algorithm:
/// 1. Candidates are items some peer rated that the target has not
/// 2. For each candidate `i` and rated item `j`, `dev(i, j)` is the mean of
///    `peer(i) - peer(j)` over peers who rated both; undefined without such peers
/// 3. The prediction for `i` is the mean of `known(j) + dev(i, j)` over every
///    `j` with a defined deviation; an item with none is left out
/// 4. Sort by raw prediction (ties by ascending item id), keep `limit`,
///    then clamp each score into `[0, max_scale]`
///
/// Never fails: "cannot predict" is expressed by leaving the item out.
pub fn predict(
    known: &ItemScores,
    peers: &[&ItemScores],
    limit: Option<usize>,
    max_scale: f32,
) -> Vec<ScoredItem> {
    if known.is_empty() || peers.is_empty() {
        return Vec::new();
    }

    // Step 1: candidate items
    let candidates: BTreeSet<ItemId> = peers
        .iter()
        .flat_map(|peer| peer.keys().copied())
        .filter(|item_id| !known.contains_key(item_id))
        .collect();

    // Step 2-3: raw predictions
    let mut predictions: Vec<ScoredItem> = candidates
        .iter()
        .filter_map(|&item_id| {
            predict_item(item_id, known, peers).map(|score| ScoredItem {
                item_id,
                score: score as f32,
            })
        })
        .collect();

    debug!(
        candidates = candidates.len(),
        predictable = predictions.len(),
        peers = peers.len(),
        "SlopeOne predictions computed"
    );

    // Step 4: rank, cut, clamp
    predictions.sort_by(by_score_desc);
    if let Some(limit) = limit {
        predictions.truncate(limit);
    }
    for prediction in predictions.iter_mut() {
        prediction.score = clamp_score(prediction.score, max_scale);
    }

    predictions
}

/// Unclamped prediction for one item, `None` when no deviation is defined
fn predict_item(item_id: ItemId, known: &ItemScores, peers: &[&ItemScores]) -> Option<f64> {
    let mut total = 0.0_f64;
    let mut defined = 0u32;

    for (&rated_id, &rated_score) in known {
        if let Some(dev) = deviation(item_id, rated_id, peers) {
            total += f64::from(rated_score) + dev;
            defined += 1;
        }
    }

    (defined > 0).then(|| total / f64::from(defined))
}

/// Average of `peer(i) - peer(j)` over peers who rated both
fn deviation(i: ItemId, j: ItemId, peers: &[&ItemScores]) -> Option<f64> {
    let mut sum = 0.0_f64;
    let mut count = 0u32;

    for peer in peers {
        if let (Some(&ri), Some(&rj)) = (peer.get(&i), peer.get(&j)) {
            sum += f64::from(ri) - f64::from(rj);
            count += 1;
        }
    }

    (count > 0).then(|| sum / f64::from(count))
}
