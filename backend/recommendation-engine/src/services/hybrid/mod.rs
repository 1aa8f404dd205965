use super::collaborative::CollaborativeRecommender;
use super::similarity::SimilarityEngine;
use super::Recommender;
use crate::config::HybridConfig;
use crate::error::Result;
use crate::models::{ItemId, ItemScores, RecommenderKind, UserId};
use crate::store::RatingStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Collaborative candidates re-ranked by content similarity.
///
/// Algorithm:
/// 1. Collaborative predictions for the profile, uncapped
/// 2. Liked items: known ratings >= `positive_rating_ratio` * max scale, best first
/// 3. Content neighbours of each liked item whose similarity is above `similarity_threshold`
/// 4. Candidates (collaborative order) that are also content neighbours, up to `count`
/// 5. Backfill with the remaining candidates in collaborative order
pub struct HybridRecommender {
    collaborative: Arc<CollaborativeRecommender>,
    similarity: Arc<SimilarityEngine>,
    ratings: Arc<dyn RatingStore>,
    config: HybridConfig,
}

impl HybridRecommender {
    pub fn new(
        collaborative: Arc<CollaborativeRecommender>,
        similarity: Arc<SimilarityEngine>,
        ratings: Arc<dyn RatingStore>,
        config: HybridConfig,
    ) -> Self {
        Self {
            collaborative,
            similarity,
            ratings,
            config,
        }
    }

    /// Known ratings at or above the positive threshold, highest first
    fn liked_items(&self, known: &ItemScores) -> Vec<ItemId> {
        let threshold = self.ratings.max_rating_scale() * self.config.positive_rating_ratio;

        let mut liked: Vec<(ItemId, f32)> = known
            .iter()
            .filter(|(_, score)| **score >= threshold)
            .map(|(&item_id, &score)| (item_id, score))
            .collect();
        liked.sort_by(|a, b| b.1.total_cmp(&a.1));
        liked.into_iter().map(|(item_id, _)| item_id).collect()
    }

    /// Content neighbours of the liked items above the similarity threshold
    fn content_matches(&self, liked: &[ItemId]) -> Result<HashSet<ItemId>> {
        let mut matches = HashSet::new();
        for &item_id in liked {
            let neighbors = self
                .similarity
                .k_nearest(item_id, self.config.content_neighbors)?;
            matches.extend(
                neighbors
                    .iter()
                    .take_while(|n| n.similarity > self.config.similarity_threshold)
                    .map(|n| n.item_id),
            );
        }
        Ok(matches)
    }
}

impl Recommender for HybridRecommender {
    fn recommend(&self, user_id: UserId, known: &ItemScores, count: usize) -> Result<Vec<ItemId>> {
        // Step 1: collaborative candidates
        let candidates: Vec<ItemId> = self
            .collaborative
            .predict_for_profile(user_id, known, None)?
            .into_iter()
            .map(|p| p.item_id)
            .collect();

        // Step 2-3: content-validated items
        let liked = self.liked_items(known);
        let matches = self.content_matches(&liked)?;

        // Step 4: intersect
        let mut recommendations: Vec<ItemId> = candidates
            .iter()
            .copied()
            .filter(|item_id| matches.contains(item_id))
            .take(count)
            .collect();
        let validated = recommendations.len();

        // Step 5: backfill
        if recommendations.len() < count {
            let chosen: HashSet<ItemId> = recommendations.iter().copied().collect();
            let remaining = count - recommendations.len();
            recommendations.extend(
                candidates
                    .iter()
                    .copied()
                    .filter(|item_id| !chosen.contains(item_id))
                    .take(remaining),
            );
        }

        debug!(
            user_id,
            candidates = candidates.len(),
            liked = liked.len(),
            validated,
            returned = recommendations.len(),
            "Hybrid recommendations ready"
        );
        Ok(recommendations)
    }

    fn kind(&self) -> RecommenderKind {
        RecommenderKind::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusteringConfig, SimilarityConfig};
    use crate::models::{AttributeValues, Item, ItemAttribute, Rating};
    use crate::services::ClusteringEngine;
    use crate::store::{InMemoryCatalog, InMemoryClusterCache, InMemoryRatingStore};

    fn item(id: ItemId, genre: &str) -> Item {
        Item::new(
            id,
            format!("item-{}", id),
            vec![ItemAttribute::new(
                "genre",
                AttributeValues::Int(vec![if genre == "drama" { 1 } else { 2 }]),
            )],
        )
    }

    /// Items 1-5 are dramas, 6-10 comedies. Users 1 and 2 share tastes.
    fn fixture() -> HybridRecommender {
        let catalog = Arc::new(InMemoryCatalog::new(
            (1..=10).map(|id| item(id, if id <= 5 { "drama" } else { "comedy" })),
        ));
        let cache = Arc::new(InMemoryClusterCache::new());
        let store = Arc::new(InMemoryRatingStore::with_cache(cache.clone()));
        store.extend(vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 6, 2.0),
            Rating::new(2, 1, 5.0),
            Rating::new(2, 6, 2.0),
            // comedies predicted high, dramas lower
            Rating::new(2, 7, 5.0),
            Rating::new(2, 8, 5.0),
            Rating::new(2, 2, 4.0),
            Rating::new(2, 3, 3.0),
        ]);

        let clustering = Arc::new(ClusteringEngine::new(
            store.clone(),
            cache,
            ClusteringConfig {
                k: 1,
                seed_min_ratings: 1,
                ..ClusteringConfig::default()
            },
        ));
        let collaborative = Arc::new(CollaborativeRecommender::new(clustering, store.clone(), 1));
        let similarity =
            Arc::new(SimilarityEngine::new(catalog, &SimilarityConfig::default()).unwrap());

        HybridRecommender::new(collaborative, similarity, store, HybridConfig::default())
    }

    fn known() -> ItemScores {
        [(1, 5.0), (6, 2.0)].into_iter().collect()
    }

    #[test]
    fn test_content_validated_items_come_first() {
        let hybrid = fixture();

        // collaborative order is 7, 8, 2, 3; only the dramas match liked item 1
        let ids = hybrid.recommend(1, &known(), 2).unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_backfill_in_collaborative_order() {
        let hybrid = fixture();

        let ids = hybrid.recommend(1, &known(), 4).unwrap();
        assert_eq!(ids, vec![2, 3, 7, 8]);

        // asking for more than exists returns every candidate once
        let ids = hybrid.recommend(1, &known(), 10).unwrap();
        assert_eq!(ids, vec![2, 3, 7, 8]);
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let hybrid = fixture();
        let first = hybrid.recommend(1, &known(), 3).unwrap();
        for _ in 0..5 {
            assert_eq!(hybrid.recommend(1, &known(), 3).unwrap(), first);
        }
        assert_eq!(hybrid.kind(), RecommenderKind::Hybrid);
    }

    #[test]
    fn test_liked_items_threshold() {
        let hybrid = fixture();
        let known: ItemScores = [(1, 3.9), (2, 4.0), (3, 5.0)].into_iter().collect();

        // 80% of a 5-point scale is 4.0
        assert_eq!(hybrid.liked_items(&known), vec![3, 2]);
    }
}
