// ============================================
// Recommendation Engine
// ============================================
//
// Wires the clustering, collaborative, content and hybrid services over one
// set of collaborators. Build one per process and share it through `Arc`.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{ClusterSnapshot, Item, ItemId, ItemScores, ScoredItem, UserId};
use crate::services::clustering::cluster_in_background;
use crate::services::{
    evaluate, ClusteringEngine, CollaborativeRecommender, EvaluationQuery, EvaluationReport,
    HybridRecommender, Neighbor, Recommender, SimilarityEngine,
};
use crate::store::{Catalog, ClusterCache, RatingStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct RecommendationEngine {
    config: EngineConfig,
    clustering: Arc<ClusteringEngine>,
    collaborative: Arc<CollaborativeRecommender>,
    similarity: Arc<SimilarityEngine>,
    hybrid: Arc<HybridRecommender>,
}

impl RecommendationEngine {
    /// Validates `config` and computes the content ponderations up front
    pub fn new(
        config: EngineConfig,
        ratings: Arc<dyn RatingStore>,
        catalog: Arc<dyn Catalog>,
        cache: Arc<dyn ClusterCache>,
    ) -> Result<Self> {
        config.validate()?;

        let clustering = Arc::new(ClusteringEngine::new(
            ratings.clone(),
            cache,
            config.clustering.clone(),
        ));
        let collaborative = Arc::new(CollaborativeRecommender::new(
            clustering.clone(),
            ratings.clone(),
            config.clustering.k,
        ));
        let similarity = Arc::new(SimilarityEngine::new(catalog, &config.similarity)?);
        let hybrid = Arc::new(HybridRecommender::new(
            collaborative.clone(),
            similarity.clone(),
            ratings,
            config.hybrid.clone(),
        ));

        info!(
            k = config.clustering.k,
            max_iterations = config.clustering.max_iterations,
            content_neighbors = config.hybrid.content_neighbors,
            "Recommendation engine ready"
        );

        Ok(Self {
            config,
            clustering,
            collaborative,
            similarity,
            hybrid,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clustering for the configured K, served from cache when clean
    pub fn clusters(&self) -> Result<Arc<ClusterSnapshot>> {
        self.clustering.cluster(self.config.clustering.k)
    }

    /// Recomputes clusters on the blocking pool, giving up after `budget`
    pub async fn refresh_clusters(&self, budget: Duration) -> Result<Arc<ClusterSnapshot>> {
        cluster_in_background(self.clustering.clone(), self.config.clustering.k, budget).await
    }

    /// Collaborative predictions for a user in the rating store
    pub fn recommend_for_user(&self, user_id: UserId, count: usize) -> Result<Vec<ScoredItem>> {
        self.collaborative.recommend_for_user(user_id, Some(count))
    }

    /// Collaborative predictions for an arbitrary rating profile
    pub fn predict(
        &self,
        user_id: UserId,
        known: &ItemScores,
        count: usize,
    ) -> Result<Vec<ScoredItem>> {
        self.collaborative.predict_for_profile(user_id, known, Some(count))
    }

    pub fn hybrid_recommend(
        &self,
        user_id: UserId,
        known: &ItemScores,
        count: usize,
    ) -> Result<Vec<ItemId>> {
        self.hybrid.recommend(user_id, known, count)
    }

    pub fn similarity(&self, a: &Item, b: &Item) -> f32 {
        self.similarity.similarity(a, b)
    }

    pub fn k_nearest(&self, item_id: ItemId, k: usize) -> Result<Vec<Neighbor>> {
        self.similarity.k_nearest(item_id, k)
    }

    pub fn similar_items(&self, item_id: ItemId, n: usize) -> Result<Vec<Item>> {
        self.similarity.similar_items(item_id, n)
    }

    pub fn collaborative(&self) -> Arc<CollaborativeRecommender> {
        self.collaborative.clone()
    }

    pub fn hybrid(&self) -> Arc<HybridRecommender> {
        self.hybrid.clone()
    }

    pub fn evaluate(
        &self,
        recommender: &dyn Recommender,
        queries: &[EvaluationQuery],
    ) -> Result<EvaluationReport> {
        evaluate(recommender, queries)
    }
}
