//! Background clustering with a deadline

use super::{ClusterControl, ClusteringEngine};
use crate::error::{EngineError, Result};
use crate::models::ClusterSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Runs `engine.cluster(k)` on the blocking pool, giving up after `budget`.
///
/// On timeout the worker is told to stop at its next iteration boundary. A
/// worker that sees the cancel flag before saving leaves the cache untouched;
/// one that already saved keeps its snapshot cached.
pub async fn cluster_in_background(
    engine: Arc<ClusteringEngine>,
    k: usize,
    budget: Duration,
) -> Result<Arc<ClusterSnapshot>> {
    let control = ClusterControl::new().with_deadline(budget);
    let worker_control = control.clone();

    info!(k, budget_ms = budget.as_millis() as u64, "Starting background clustering");
    let handle = tokio::task::spawn_blocking(move || engine.cluster_with(k, &worker_control));

    match timeout(budget, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(EngineError::BackgroundJob(join_err.to_string())),
        Err(_) => {
            control.cancel();
            warn!(k, budget_ms = budget.as_millis() as u64, "Background clustering timed out");
            Err(EngineError::DeadlineExceeded(budget))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusteringConfig;
    use crate::models::Rating;
    use crate::store::{ClusterCache, InMemoryClusterCache, InMemoryRatingStore};

    fn engine(cache: Arc<InMemoryClusterCache>) -> Arc<ClusteringEngine> {
        let store = Arc::new(InMemoryRatingStore::from_ratings(vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 11, 4.0),
            Rating::new(2, 20, 1.0),
            Rating::new(2, 21, 2.0),
            Rating::new(3, 10, 4.0),
            Rating::new(3, 11, 4.0),
            Rating::new(4, 20, 2.0),
            Rating::new(4, 21, 2.0),
        ]));
        let config = ClusteringConfig {
            seed_min_ratings: 2,
            ..ClusteringConfig::default()
        };
        Arc::new(ClusteringEngine::new(store, cache, config))
    }

    #[tokio::test]
    async fn test_background_clustering_completes() {
        let cache = Arc::new(InMemoryClusterCache::new());
        let snapshot = cluster_in_background(engine(cache.clone()), 2, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(snapshot.effective_k(), 2);
        assert!(cache.load(snapshot.key).is_some());
    }

    #[tokio::test]
    async fn test_background_clustering_deadline() {
        let cache = Arc::new(InMemoryClusterCache::new());
        let result = cluster_in_background(engine(cache.clone()), 2, Duration::ZERO).await;

        assert!(matches!(result, Err(EngineError::DeadlineExceeded(_))));
        assert!(cache.is_empty());
    }
}
