use super::clustering::{nearest_centroid, ClusteringEngine};
use super::prediction::predict;
use super::Recommender;
use crate::error::{EngineError, Result};
use crate::models::{
    to_item_scores, ClusterSnapshot, ItemId, ItemScores, RecommenderKind, ScoredItem, UserId,
};
use crate::store::RatingStore;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Collaborative filtering: KMeans peers + SlopeOne predictions.
///
/// Peers of a clustered user are the other members of its group. A profile
/// that is not part of the clustering borrows the group of its nearest
/// centroid.
pub struct CollaborativeRecommender {
    clustering: Arc<ClusteringEngine>,
    ratings: Arc<dyn RatingStore>,
    k: usize,
}

impl CollaborativeRecommender {
    pub fn new(clustering: Arc<ClusteringEngine>, ratings: Arc<dyn RatingStore>, k: usize) -> Self {
        Self {
            clustering,
            ratings,
            k,
        }
    }

    /// Predictions for a user already in the rating store, from all of its ratings
    pub fn recommend_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredItem>> {
        let known = to_item_scores(&self.ratings.ratings_for_user(user_id)?);
        let snapshot = self.clustering.cluster(self.k)?;
        let peers = snapshot
            .peers_of(user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;

        Ok(self.predict_with_peers(user_id, &known, &peers, limit))
    }

    /// Predictions for `known`, treated as the ratings of `user_id`.
    ///
    /// The user does not need to exist in the store.
    pub fn predict_for_profile(
        &self,
        user_id: UserId,
        known: &ItemScores,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredItem>> {
        if known.is_empty() {
            error!(user_id, "Prediction requested for a profile without ratings");
            return Err(EngineError::InvariantViolation(format!(
                "user {} has no known ratings",
                user_id
            )));
        }

        let snapshot = self.clustering.cluster(self.k)?;
        let peers = peers_for(&snapshot, user_id, known)?;

        Ok(self.predict_with_peers(user_id, known, &peers, limit))
    }

    fn predict_with_peers(
        &self,
        user_id: UserId,
        known: &ItemScores,
        peer_ids: &[UserId],
        limit: Option<usize>,
    ) -> Vec<ScoredItem> {
        let profiles = self.ratings.ratings_by_user();
        let peers: Vec<&ItemScores> = peer_ids
            .iter()
            .filter_map(|peer_id| profiles.get(peer_id))
            .collect();

        let predictions = predict(known, &peers, limit, self.ratings.max_rating_scale());
        info!(
            user_id,
            peers = peers.len(),
            predictions = predictions.len(),
            "Collaborative predictions ready"
        );
        predictions
    }
}

/// The user's own group when clustered, otherwise the nearest centroid's group
fn peers_for(
    snapshot: &ClusterSnapshot,
    user_id: UserId,
    known: &ItemScores,
) -> Result<Vec<UserId>> {
    if let Some(peers) = snapshot.peers_of(user_id) {
        return Ok(peers);
    }

    let (cluster, distance) = nearest_centroid(known, &snapshot.centroids).ok_or_else(|| {
        EngineError::InvariantViolation("cluster snapshot has no centroids".to_string())
    })?;
    debug!(user_id, cluster, distance, "Profile matched to nearest centroid");

    Ok(snapshot.groups[cluster]
        .iter()
        .copied()
        .filter(|&peer| peer != user_id)
        .collect())
}

impl Recommender for CollaborativeRecommender {
    fn recommend(&self, user_id: UserId, known: &ItemScores, count: usize) -> Result<Vec<ItemId>> {
        Ok(self
            .predict_for_profile(user_id, known, Some(count))?
            .into_iter()
            .map(|p| p.item_id)
            .collect())
    }

    fn kind(&self) -> RecommenderKind {
        RecommenderKind::Collaborative
    }
}
