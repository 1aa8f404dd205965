use recommendation_engine::config::{ClusteringConfig, EngineConfig};
use recommendation_engine::models::{
    AttributeValues, ClusterSnapshot, Item, ItemAttribute, ItemId, ItemScores, Rating,
    RecommenderKind,
};
use recommendation_engine::services::EvaluationQuery;
use recommendation_engine::{
    ClusterCache, EngineError, InMemoryCatalog, InMemoryClusterCache, InMemoryRatingStore,
    RatingStore, RecommendationEngine, Recommender,
};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("recommendation_engine=debug")
        .try_init();
}

fn item(id: ItemId, genre: i64, decade: i64) -> Item {
    Item::new(
        id,
        format!("title-{}", id),
        vec![
            ItemAttribute::new("title", AttributeValues::Text(vec![format!("title-{}", id)])),
            ItemAttribute::new("genre", AttributeValues::Int(vec![genre])),
            ItemAttribute::new("decade", AttributeValues::Int(vec![decade])),
        ],
    )
    .with_description(format!("catalog entry {}", id))
}

struct Fixture {
    store: Arc<InMemoryRatingStore>,
    cache: Arc<InMemoryClusterCache>,
    engine: RecommendationEngine,
}

/// Two taste groups: users 1, 3 and 5 like items 1-4, users 2, 4 and 6 like items 5-8
fn fixture() -> Fixture {
    init_tracing();

    let catalog = Arc::new(InMemoryCatalog::new((1..=10).map(|id| {
        let genre = if id <= 5 { 1 } else { 2 };
        let decade = if id % 2 == 0 { 1990 } else { 2000 };
        item(id, genre, decade)
    })));
    let cache = Arc::new(InMemoryClusterCache::new());
    let store = Arc::new(InMemoryRatingStore::with_cache(cache.clone()));
    store.extend(vec![
        Rating::new(1, 1, 5.0),
        Rating::new(1, 2, 4.0),
        Rating::new(1, 3, 4.0),
        Rating::new(3, 1, 4.0),
        Rating::new(3, 2, 4.0),
        Rating::new(3, 3, 5.0),
        Rating::new(3, 4, 5.0),
        Rating::new(5, 1, 5.0),
        Rating::new(5, 2, 3.0),
        Rating::new(5, 4, 4.0),
        Rating::new(5, 5, 2.0),
        Rating::new(2, 5, 5.0),
        Rating::new(2, 6, 4.0),
        Rating::new(2, 7, 4.0),
        Rating::new(4, 5, 4.0),
        Rating::new(4, 6, 5.0),
        Rating::new(4, 8, 5.0),
        Rating::new(6, 6, 4.0),
        Rating::new(6, 7, 5.0),
        Rating::new(6, 8, 4.0),
    ]);
    catalog.recompute_scores(store.as_ref());

    let config = EngineConfig {
        clustering: ClusteringConfig {
            k: 2,
            seed_min_ratings: 3,
            ..ClusteringConfig::default()
        },
        ..EngineConfig::default()
    };
    let engine = RecommendationEngine::new(config, store.clone(), catalog, cache.clone()).unwrap();

    Fixture {
        store,
        cache,
        engine,
    }
}

#[test]
fn test_clusters_follow_taste_groups() {
    let f = fixture();
    let snapshot = f.engine.clusters().unwrap();

    let mut groups: Vec<Vec<u32>> = snapshot
        .groups
        .iter()
        .map(|g| g.iter().copied().collect())
        .collect();
    groups.sort();
    assert_eq!(groups, vec![vec![1, 3, 5], vec![2, 4, 6]]);
    assert_eq!(snapshot.key.dataset_size, 6);
}

#[test]
fn test_cluster_cache_idempotence_and_invalidation() {
    let f = fixture();

    let first = f.engine.clusters().unwrap();
    let second = f.engine.clusters().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.cache.stats().hits, 1);

    f.store.add_rating(Rating::new(1, 4, 4.0));
    assert!(f.cache.load(first.key).is_none());

    let third = f.engine.clusters().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.groups, first.groups);
}

#[test]
fn test_existing_user_recommendations_are_clamped() {
    let f = fixture();
    let predictions = f.engine.recommend_for_user(1, 10).unwrap();

    assert!(!predictions.is_empty());
    assert!(predictions.iter().all(|p| (0.0..=5.0).contains(&p.score)));
    // only items rated by group peers can be predicted
    assert!(predictions.iter().all(|p| p.item_id == 4 || p.item_id == 5));

    assert!(matches!(
        f.engine.recommend_for_user(77, 3),
        Err(EngineError::UnknownUser(77))
    ));
}

#[test]
fn test_hybrid_prefers_content_matches() {
    let f = fixture();
    let known: ItemScores = [(1, 5.0), (2, 4.0), (3, 4.0)].into_iter().collect();

    let ids = f.engine.hybrid_recommend(1, &known, 2).unwrap();
    let again = f.engine.hybrid_recommend(1, &known, 2).unwrap();
    assert_eq!(ids, again);
    assert!(ids.len() <= 2);
    assert!(ids.iter().all(|id| !known.contains_key(id)));
}

#[test]
fn test_k_nearest_and_similar_items() {
    let f = fixture();

    let nearest = f.engine.k_nearest(1, 3).unwrap();
    assert_eq!(nearest.len(), 3);
    assert!(nearest.iter().all(|n| (0.0..=100.0).contains(&n.similarity)));
    assert!(nearest.windows(2).all(|w| w[0].similarity >= w[1].similarity));

    let items = f.engine.similar_items(1, 2).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].item_id, nearest[0].item_id);

    assert!(matches!(
        f.engine.k_nearest(404, 3),
        Err(EngineError::UnknownItem(404))
    ));
}

#[test]
fn test_evaluation_over_both_recommenders() {
    let f = fixture();

    // user 5 hides two of its ratings
    let queries = vec![EvaluationQuery {
        user_id: 5,
        known: [(1, 5.0), (2, 3.0)].into_iter().collect(),
        held_out: [(4, 4.0), (5, 2.0)].into_iter().collect(),
    }];

    let collaborative = f.engine.collaborative();
    let report = f.engine.evaluate(collaborative.as_ref(), &queries).unwrap();
    assert_eq!(report.recommender, RecommenderKind::Collaborative);
    assert!(report.mean_ndcg > 0.0 && report.mean_ndcg <= 1.0 + 1e-12);

    let hybrid = f.engine.hybrid();
    let report = f.engine.evaluate(hybrid.as_ref(), &queries).unwrap();
    assert_eq!(report.recommender, RecommenderKind::Hybrid);
    assert_eq!(hybrid.kind(), RecommenderKind::Hybrid);
}

#[test]
fn test_snapshot_and_report_serialize() -> anyhow::Result<()> {
    let f = fixture();

    let snapshot = f.engine.clusters()?;
    let json = serde_json::to_value(snapshot.as_ref())?;
    assert_eq!(json["key"]["k"], 2);
    let restored: ClusterSnapshot = serde_json::from_value(json)?;
    assert_eq!(restored, *snapshot);

    let queries = vec![EvaluationQuery {
        user_id: 5,
        known: [(1, 5.0), (2, 3.0)].into_iter().collect(),
        held_out: [(4, 4.0), (5, 2.0)].into_iter().collect(),
    }];
    let report = f.engine.evaluate(f.engine.collaborative().as_ref(), &queries)?;
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["recommender"], "collaborative");
    assert_eq!(json["per_query"][0]["ranked"], serde_json::json!([4]));

    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        clustering: ClusteringConfig {
            k: 0,
            ..ClusteringConfig::default()
        },
        ..EngineConfig::default()
    };
    let store = Arc::new(InMemoryRatingStore::new());
    let catalog = Arc::new(InMemoryCatalog::new(vec![item(1, 1, 1990)]));
    let cache = Arc::new(InMemoryClusterCache::new());

    assert!(matches!(
        RecommendationEngine::new(config, store, catalog, cache),
        Err(EngineError::Config(_))
    ));
}

#[tokio::test]
async fn test_background_refresh() {
    let f = fixture();
    let snapshot = f.engine.refresh_clusters(Duration::from_secs(5)).await.unwrap();

    assert_eq!(snapshot.user_count(), f.store.all_user_ids().len());
    assert!(Arc::ptr_eq(&snapshot, &f.engine.clusters().unwrap()));
}
