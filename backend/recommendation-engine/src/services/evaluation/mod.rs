use super::metrics::RankingQuality;
use super::Recommender;
use crate::error::{DegenerateInput, EngineError, Result};
use crate::models::{ItemId, ItemScores, RecommenderKind, UserId};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// One offline test case: what the recommender may see and what it is scored on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationQuery {
    pub user_id: UserId,
    pub known: ItemScores,
    pub held_out: ItemScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub user_id: UserId,
    /// Recommended items restricted to the held-out set, in recommended order
    pub ranked: Vec<ItemId>,
    pub quality: RankingQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub recommender: RecommenderKind,
    pub per_query: Vec<QueryOutcome>,
    pub mean_dcg: f64,
    pub mean_idcg: f64,
    pub mean_ndcg: f64,
    /// Queries skipped because their IDCG was zero
    pub degenerate_queries: Vec<UserId>,
}

/// Scores `recommender` over every query and averages the metrics.
///
/// Each query asks for an uncapped recommendation list, keeps only the
/// held-out items, and scores that ranking. Queries whose IDCG is zero are
/// listed in `degenerate_queries` and left out of the means. Other errors
/// abort the run.
pub fn evaluate(
    recommender: &dyn Recommender,
    queries: &[EvaluationQuery],
) -> Result<EvaluationReport> {
    let started = Instant::now();
    let mut per_query = Vec::with_capacity(queries.len());
    let mut degenerate_queries = Vec::new();

    for query in queries {
        let ranked: Vec<ItemId> = recommender
            .recommend(query.user_id, &query.known, usize::MAX)?
            .into_iter()
            .filter(|item_id| query.held_out.contains_key(item_id))
            .collect();

        match RankingQuality::compute(&query.held_out, &ranked) {
            Ok(quality) => per_query.push(QueryOutcome {
                user_id: query.user_id,
                ranked,
                quality,
            }),
            Err(EngineError::Degenerate(DegenerateInput::ZeroIdcg)) => {
                warn!(
                    user_id = query.user_id,
                    ranked = ranked.len(),
                    "IDCG is zero, query left out of the averages"
                );
                degenerate_queries.push(query.user_id);
            }
            Err(e) => return Err(e),
        }
    }

    if per_query.is_empty() {
        return Err(DegenerateInput::NoScoredQueries.into());
    }

    let n = per_query.len() as f64;
    let mean = |f: fn(&RankingQuality) -> f64| {
        per_query.iter().map(|q| f(&q.quality)).sum::<f64>() / n
    };
    let mean_dcg = mean(|q| q.dcg);
    let mean_idcg = mean(|q| q.idcg);
    let mean_ndcg = mean(|q| q.ndcg);

    info!(
        recommender = %recommender.kind(),
        queries = queries.len(),
        scored = per_query.len(),
        skipped = degenerate_queries.len(),
        mean_ndcg,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Evaluation finished"
    );

    Ok(EvaluationReport {
        recommender: recommender.kind(),
        per_query,
        mean_dcg,
        mean_idcg,
        mean_ndcg,
        degenerate_queries,
    })
}
