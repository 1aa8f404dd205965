pub mod clustering;
pub mod collaborative;
pub mod evaluation;
pub mod hybrid;
pub mod metrics;
pub mod prediction;
pub mod similarity;

use crate::error::Result;
use crate::models::{ItemId, ItemScores, RecommenderKind, UserId};

pub use clustering::{ClusterControl, ClusteringEngine};
pub use collaborative::CollaborativeRecommender;
pub use evaluation::{evaluate, EvaluationQuery, EvaluationReport, QueryOutcome};
pub use hybrid::HybridRecommender;
pub use metrics::RankingQuality;
pub use similarity::{Neighbor, Ponderations, SimilarityEngine};

/// A strategy that turns a user's known ratings into a ranked item list
pub trait Recommender: Send + Sync {
    /// Up to `count` items, best first, excluding items in `known`
    fn recommend(&self, user_id: UserId, known: &ItemScores, count: usize) -> Result<Vec<ItemId>>;

    fn kind(&self) -> RecommenderKind;
}
