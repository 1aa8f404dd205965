//! Collaborator interfaces the engine consumes.
//!
//! Ratings, the item catalog and the cluster cache are owned by the data-access
//! layer. The engine only sees these traits, so any persistence backend can sit
//! behind them. `memory` provides process-local implementations.

pub mod memory;

use crate::error::Result;
use crate::models::{ClusterKey, ClusterSnapshot, Item, ItemId, ItemScores, Rating, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use memory::{CacheStats, InMemoryCatalog, InMemoryClusterCache, InMemoryRatingStore};

/// All (user, item, score) observations known to the system
pub trait RatingStore: Send + Sync {
    fn all_user_ids(&self) -> BTreeSet<UserId>;

    /// Fails with `UnknownUser` when the user has no ratings
    fn ratings_for_user(&self, user_id: UserId) -> Result<Vec<Rating>>;

    fn ratings_for_item(&self, item_id: ItemId) -> Vec<Rating>;

    /// Every user's ratings keyed by user
    fn ratings_by_user(&self) -> BTreeMap<UserId, ItemScores>;

    fn rating_count(&self) -> usize;

    /// 5, 10 or 100, inferred from observed scores
    fn max_rating_scale(&self) -> f32;

    /// Write counter, bumped by every insert, edit or removal
    fn generation(&self) -> u64;
}

/// Item catalog in load order
pub trait Catalog: Send + Sync {
    fn all_items(&self) -> Vec<Item>;

    /// Fails with `UnknownItem` when absent
    fn item(&self, item_id: ItemId) -> Result<Item>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Previously computed clusterings keyed by (K, dataset size)
pub trait ClusterCache: Send + Sync {
    /// Returns the snapshot only if present and not dirty
    fn load(&self, key: ClusterKey) -> Option<Arc<ClusterSnapshot>>;

    /// Stores a clean snapshot under `snapshot.key`
    fn save(&self, snapshot: Arc<ClusterSnapshot>);

    /// Called whenever a rating enters the system
    fn mark_dirty(&self);
}
