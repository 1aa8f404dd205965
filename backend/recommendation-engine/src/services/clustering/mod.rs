// ============================================
// Clustering Engine (KMeans over users)
// ============================================
//
// Partitions users into K groups of similar taste.
//
//   1. Serve a clean cached snapshot for (K, #users) when one exists
//   2. Seed K centroids with the first users (ascending id) that have
//      at least `seed_min_ratings` ratings
//   3. Assign every user to the nearest centroid
//   4. Recompute each centroid as the per-item mean of its members'
//      ratings, reassign everyone, repeat until nobody moves
//   5. Save the snapshot under (K, #users), tagged with the rating store
//      generation it was read at; older snapshots are never served
//
// Recomputation for one key is serialised so concurrent callers compute
// at most once.

mod distance;
pub mod job;

pub use distance::{distance, nearest_centroid, NO_OVERLAP_DISTANCE, UNCOMPARED_DISTANCE};
pub use job::cluster_in_background;

use crate::config::ClusteringConfig;
use crate::error::{DegenerateInput, EngineError, Result};
use crate::models::{ClusterKey, ClusterSnapshot, ItemId, ItemScores, UserId};
use crate::store::{ClusterCache, RatingStore};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cancellation flag and optional deadline for a clustering run.
///
/// Clones share the flag, so a clone handed to another thread can stop the run.
#[derive(Debug, Clone, Default)]
pub struct ClusterControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl ClusterControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails once cancelled or past the deadline
    pub fn check(&self, completed_iterations: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled {
                iterations: completed_iterations,
            });
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EngineError::DeadlineExceeded(budget));
            }
        }
        Ok(())
    }
}

pub struct ClusteringEngine {
    ratings: Arc<dyn RatingStore>,
    cache: Arc<dyn ClusterCache>,
    config: ClusteringConfig,
    recompute_locks: DashMap<ClusterKey, Arc<Mutex<()>>>,
}

impl ClusteringEngine {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        cache: Arc<dyn ClusterCache>,
        config: ClusteringConfig,
    ) -> Self {
        Self {
            ratings,
            cache,
            config,
            recompute_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster with the configured deadline, if any
    pub fn cluster(&self, k: usize) -> Result<Arc<ClusterSnapshot>> {
        let control = match self.config.deadline() {
            Some(budget) => ClusterControl::new().with_deadline(budget),
            None => ClusterControl::new(),
        };
        self.cluster_with(k, &control)
    }

    pub fn cluster_with(
        &self,
        k: usize,
        control: &ClusterControl,
    ) -> Result<Arc<ClusterSnapshot>> {
        let generation = self.ratings.generation();
        let key = ClusterKey::new(k, self.ratings.all_user_ids().len());
        if let Some(snapshot) = self.load_current(key, generation) {
            debug!(%key, "Cluster cache hit");
            return Ok(snapshot);
        }

        // The key and the lock follow the profiles actually clustered
        let generation = self.ratings.generation();
        let profiles = self.ratings.ratings_by_user();
        let key = ClusterKey::new(k, profiles.len());

        let lock = self
            .recompute_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        // Another caller may have finished while we waited
        if let Some(snapshot) = self.load_current(key, generation) {
            debug!(%key, "Cluster snapshot computed by concurrent caller");
            return Ok(snapshot);
        }

        let started = Instant::now();
        let mut snapshot = kmeans(k, &profiles, &self.config, control)?;
        snapshot.generation = generation;
        let snapshot = Arc::new(snapshot);

        info!(
            key = %snapshot.key,
            groups = snapshot.effective_k(),
            iterations = snapshot.iterations,
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "KMeans converged"
        );

        // A run stopped after its last pass must not reach the cache
        control.check(snapshot.iterations)?;
        self.cache.save(snapshot.clone());
        Ok(snapshot)
    }

    /// Cached snapshot for `key`, unless it was built before `generation`
    fn load_current(&self, key: ClusterKey, generation: u64) -> Option<Arc<ClusterSnapshot>> {
        self.cache.load(key).filter(|snapshot| {
            let current = snapshot.generation >= generation;
            if !current {
                debug!(
                    %key,
                    cached = snapshot.generation,
                    generation,
                    "Cached snapshot predates the latest ratings"
                );
            }
            current
        })
    }
}

/// Runs KMeans from scratch over `profiles` (user -> ratings)
pub fn kmeans(
    k: usize,
    profiles: &BTreeMap<UserId, ItemScores>,
    config: &ClusteringConfig,
    control: &ClusterControl,
) -> Result<ClusterSnapshot> {
    if k == 0 {
        return Err(EngineError::Config("K must be >= 1".to_string()));
    }

    if let Some((&user_id, _)) = profiles.iter().find(|(_, scores)| scores.is_empty()) {
        error!(user_id, "User without ratings reached the clustering engine");
        return Err(EngineError::InvariantViolation(format!(
            "user {} has no ratings and cannot be clustered",
            user_id
        )));
    }

    let users: Vec<UserId> = profiles.keys().copied().collect();
    let vectors: Vec<&ItemScores> = profiles.values().collect();

    let mut centroids: Vec<ItemScores> = vectors
        .iter()
        .filter(|scores| scores.len() >= config.seed_min_ratings)
        .take(k)
        .map(|&scores| scores.clone())
        .collect();

    let found = centroids.len();
    if found < k {
        if found == 0 || !config.allow_partial_seeding {
            return Err(DegenerateInput::InsufficientSeeds {
                requested: k,
                found,
            }
            .into());
        }
        warn!(
            requested = k,
            found, "Fewer seed users than requested clusters, continuing with partial seeding"
        );
    }

    let mut assignment = vec![0usize; users.len()];
    for (slot, scores) in assignment.iter_mut().zip(&vectors) {
        *slot = nearest_index(scores, &centroids)?;
    }
    ensure_no_empty_cluster(&assignment, centroids.len(), 0)?;

    let mut iterations = 0;
    loop {
        control.check(iterations)?;
        if iterations == config.max_iterations {
            warn!(iterations, "KMeans reached the iteration cap");
            return Err(EngineError::ConvergenceLimit { iterations });
        }
        iterations += 1;

        centroids = recompute_centroids(&assignment, &vectors, centroids.len());

        let mut moved = 0usize;
        for (slot, scores) in assignment.iter_mut().zip(&vectors) {
            let nearest = nearest_index(scores, &centroids)?;
            if nearest != *slot {
                *slot = nearest;
                moved += 1;
            }
        }
        debug!(iteration = iterations, moved, "KMeans pass");

        ensure_no_empty_cluster(&assignment, centroids.len(), iterations)?;
        if moved == 0 {
            break;
        }
    }

    let mut groups: Vec<BTreeSet<UserId>> = vec![BTreeSet::new(); centroids.len()];
    for (&user_id, &cluster) in users.iter().zip(&assignment) {
        groups[cluster].insert(user_id);
    }

    Ok(ClusterSnapshot {
        key: ClusterKey::new(k, users.len()),
        groups,
        centroids,
        iterations,
        generation: 0,
        computed_at: Utc::now(),
    })
}

fn nearest_index(scores: &ItemScores, centroids: &[ItemScores]) -> Result<usize> {
    nearest_centroid(scores, centroids)
        .map(|(idx, _)| idx)
        .ok_or_else(|| {
            EngineError::InvariantViolation("no centroid to compare a user against".to_string())
        })
}

/// Per-item mean of the members' ratings; items no member rated are absent
fn recompute_centroids(
    assignment: &[usize],
    vectors: &[&ItemScores],
    cluster_count: usize,
) -> Vec<ItemScores> {
    let mut sums: Vec<BTreeMap<ItemId, (f64, u32)>> = vec![BTreeMap::new(); cluster_count];

    for (&cluster, scores) in assignment.iter().zip(vectors) {
        for (&item_id, &score) in scores.iter() {
            let entry = sums[cluster].entry(item_id).or_insert((0.0, 0));
            entry.0 += f64::from(score);
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|items| {
            items
                .into_iter()
                .map(|(item_id, (sum, count))| (item_id, (sum / f64::from(count)) as f32))
                .collect()
        })
        .collect()
}

fn ensure_no_empty_cluster(
    assignment: &[usize],
    cluster_count: usize,
    iteration: usize,
) -> Result<()> {
    let mut sizes = vec![0usize; cluster_count];
    for &cluster in assignment {
        sizes[cluster] += 1;
    }
    match sizes.iter().position(|&size| size == 0) {
        Some(cluster) => {
            warn!(cluster, iteration, "KMeans produced an empty cluster");
            Err(DegenerateInput::EmptyCluster { cluster, iteration }.into())
        }
        None => Ok(()),
    }
}
