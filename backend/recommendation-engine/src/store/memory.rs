//! Process-local implementations of the collaborator traits

use super::{Catalog, ClusterCache, RatingStore};
use crate::error::{EngineError, Result};
use crate::models::{
    ClusterKey, ClusterSnapshot, Item, ItemId, ItemScores, Rating, RatingScale, UserId,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// ============================================
// Ratings
// ============================================

#[derive(Default)]
struct RatingTable {
    by_user: BTreeMap<UserId, ItemScores>,
    scale: RatingScale,
}

/// Ratings held in memory.
///
/// Writes mark the attached cluster cache dirty so the next clustering
/// request recomputes from scratch.
#[derive(Default)]
pub struct InMemoryRatingStore {
    table: RwLock<RatingTable>,
    generation: AtomicU64,
    cache: Option<Arc<dyn ClusterCache>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<dyn ClusterCache>) -> Self {
        Self {
            table: RwLock::new(RatingTable::default()),
            generation: AtomicU64::new(0),
            cache: Some(cache),
        }
    }

    pub fn from_ratings(ratings: impl IntoIterator<Item = Rating>) -> Self {
        let store = Self::new();
        store.load(ratings);
        store
    }

    /// Bulk insert; marks the cluster cache dirty when anything was added
    pub fn extend(&self, ratings: impl IntoIterator<Item = Rating>) {
        let inserted = self.load(ratings);
        if inserted > 0 {
            debug!(inserted, "Ratings loaded");
            self.invalidate_clusters();
        }
    }

    fn load(&self, ratings: impl IntoIterator<Item = Rating>) -> usize {
        let mut table = self.table.write();
        let mut inserted = 0;
        for rating in ratings {
            table.scale = table.scale.observe(rating.score);
            table
                .by_user
                .entry(rating.user_id)
                .or_default()
                .insert(rating.item_id, rating.score);
            inserted += 1;
        }
        if inserted > 0 {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        inserted
    }

    /// Inserts or overwrites the user's score for the item
    pub fn add_rating(&self, rating: Rating) {
        {
            let mut table = self.table.write();
            table.scale = table.scale.observe(rating.score);
            table
                .by_user
                .entry(rating.user_id)
                .or_default()
                .insert(rating.item_id, rating.score);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        debug!(
            user_id = rating.user_id,
            item_id = rating.item_id,
            score = rating.score,
            "Rating added"
        );
        self.invalidate_clusters();
    }

    pub fn remove_rating(&self, user_id: UserId, item_id: ItemId) -> Result<Rating> {
        let removed = {
            let mut table = self.table.write();
            let scores = table
                .by_user
                .get_mut(&user_id)
                .ok_or(EngineError::UnknownRating { user_id, item_id })?;
            let score = scores
                .remove(&item_id)
                .ok_or(EngineError::UnknownRating { user_id, item_id })?;
            if scores.is_empty() {
                table.by_user.remove(&user_id);
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            Rating::new(user_id, item_id, score)
        };
        self.invalidate_clusters();
        Ok(removed)
    }

    /// Replaces an existing rating (delete followed by add)
    pub fn edit_rating(&self, rating: Rating) -> Result<()> {
        self.remove_rating(rating.user_id, rating.item_id)?;
        self.add_rating(rating);
        Ok(())
    }

    pub fn rating_scale(&self) -> RatingScale {
        self.table.read().scale
    }

    fn invalidate_clusters(&self) {
        if let Some(cache) = &self.cache {
            cache.mark_dirty();
        }
    }
}

impl RatingStore for InMemoryRatingStore {
    fn all_user_ids(&self) -> BTreeSet<UserId> {
        self.table.read().by_user.keys().copied().collect()
    }

    fn ratings_for_user(&self, user_id: UserId) -> Result<Vec<Rating>> {
        let table = self.table.read();
        let scores = table
            .by_user
            .get(&user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;
        Ok(scores
            .iter()
            .map(|(&item_id, &score)| Rating::new(user_id, item_id, score))
            .collect())
    }

    fn ratings_for_item(&self, item_id: ItemId) -> Vec<Rating> {
        self.table
            .read()
            .by_user
            .iter()
            .filter_map(|(&user_id, scores)| {
                scores
                    .get(&item_id)
                    .map(|&score| Rating::new(user_id, item_id, score))
            })
            .collect()
    }

    fn ratings_by_user(&self) -> BTreeMap<UserId, ItemScores> {
        self.table.read().by_user.clone()
    }

    fn rating_count(&self) -> usize {
        self.table.read().by_user.values().map(BTreeMap::len).sum()
    }

    fn max_rating_scale(&self) -> f32 {
        self.table.read().scale.max()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

// ============================================
// Catalog
// ============================================

#[derive(Default)]
struct ItemTable {
    items: Vec<Item>,
    index: BTreeMap<ItemId, usize>,
}

/// Item catalog that keeps load order
#[derive(Default)]
pub struct InMemoryCatalog {
    table: RwLock<ItemTable>,
}

impl InMemoryCatalog {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        let catalog = Self::default();
        for item in items {
            catalog.insert(item);
        }
        catalog
    }

    /// Adds the item, replacing any item with the same id in place
    pub fn insert(&self, item: Item) {
        let mut table = self.table.write();
        match table.index.get(&item.item_id).copied() {
            Some(pos) => table.items[pos] = item,
            None => {
                let pos = table.items.len();
                table.index.insert(item.item_id, pos);
                table.items.push(item);
            }
        }
    }

    /// Sets every item's aggregate score to the mean of its ratings (0 when unrated)
    pub fn recompute_scores(&self, ratings: &dyn RatingStore) {
        let mut table = self.table.write();
        for item in table.items.iter_mut() {
            let item_ratings = ratings.ratings_for_item(item.item_id);
            item.score = if item_ratings.is_empty() {
                0.0
            } else {
                let sum: f64 = item_ratings.iter().map(|r| f64::from(r.score)).sum();
                (sum / item_ratings.len() as f64) as f32
            };
        }
    }

    /// Best aggregate scores first, ties by ascending item id
    pub fn top_rated(&self, n: usize) -> Vec<Item> {
        let mut items = self.table.read().items.clone();
        items.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        items.truncate(n);
        items
    }
}

impl Catalog for InMemoryCatalog {
    fn all_items(&self) -> Vec<Item> {
        self.table.read().items.clone()
    }

    fn item(&self, item_id: ItemId) -> Result<Item> {
        let table = self.table.read();
        table
            .index
            .get(&item_id)
            .map(|&pos| table.items[pos].clone())
            .ok_or(EngineError::UnknownItem(item_id))
    }

    fn len(&self) -> usize {
        self.table.read().items.len()
    }
}

// ============================================
// Cluster cache
// ============================================

#[derive(Debug, Clone)]
struct CachedEntry {
    snapshot: Arc<ClusterSnapshot>,
    dirty: bool,
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub saves: u64,
    pub invalidations: u64,
}

/// Cluster snapshots held in memory
#[derive(Default)]
pub struct InMemoryClusterCache {
    store: DashMap<ClusterKey, CachedEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    saves: AtomicU64,
    invalidations: AtomicU64,
}

impl InMemoryClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl ClusterCache for InMemoryClusterCache {
    fn load(&self, key: ClusterKey) -> Option<Arc<ClusterSnapshot>> {
        match self.store.get(&key) {
            Some(entry) if !entry.dirty => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.snapshot.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn save(&self, snapshot: Arc<ClusterSnapshot>) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.store.insert(
            snapshot.key,
            CachedEntry {
                snapshot,
                dirty: false,
            },
        );
    }

    fn mark_dirty(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        for mut entry in self.store.iter_mut() {
            entry.dirty = true;
        }
    }
}
