pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::EngineConfig;
pub use engine::RecommendationEngine;
pub use error::{DegenerateInput, EngineError, Result};
pub use services::{
    ClusterControl, ClusteringEngine, CollaborativeRecommender, HybridRecommender, Recommender,
    SimilarityEngine,
};
pub use store::{
    Catalog, ClusterCache, InMemoryCatalog, InMemoryClusterCache, InMemoryRatingStore, RatingStore,
};
