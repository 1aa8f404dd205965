use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    pub clustering: ClusteringConfig,
    pub similarity: SimilarityConfig,
    pub hybrid: HybridConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Number of user groups (K)
    pub k: usize,
    /// Minimum ratings a user needs to seed an initial centroid
    pub seed_min_ratings: usize,
    /// Proceed with fewer than K centroids instead of failing
    pub allow_partial_seeding: bool,
    pub max_iterations: usize,
    pub deadline_secs: Option<u64>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: 5,
            seed_min_ratings: 15,
            allow_partial_seeding: false,
            max_iterations: 500,
            deadline_secs: None,
        }
    }
}

impl ClusteringConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Catalog items sampled when computing ponderations
    pub sample_size: usize,
    /// Attribute dropped when distinct values exceed this share of items
    pub distinct_ratio: f64,
    /// Share of items a value group must cover to count towards dispersion
    pub coverage_ratio: f64,
    /// Attribute dropped when one value covers more than this share
    pub dominant_ratio: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            sample_size: 1500,
            distinct_ratio: 0.9,
            coverage_ratio: 0.2,
            dominant_ratio: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Share of the max rating scale at which a rating counts as liked
    pub positive_rating_ratio: f32,
    /// Neighbours at or below this similarity (0-100) are discarded
    pub similarity_threshold: f32,
    /// Content neighbours fetched per liked item
    pub content_neighbors: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            positive_rating_ratio: 0.8,
            similarity_threshold: 60.0,
            content_neighbors: 5,
        }
    }
}

impl EngineConfig {
    /// Load from `CLUSTERING_*`, `SIMILARITY_*` and `HYBRID_*` variables; unset ones keep defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = EngineConfig {
            clustering: envy::prefixed("CLUSTERING_").from_env::<ClusteringConfig>()?,
            similarity: envy::prefixed("SIMILARITY_").from_env::<SimilarityConfig>()?,
            hybrid: envy::prefixed("HYBRID_").from_env::<HybridConfig>()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ratio_ok = |r: f64| r > 0.0 && r <= 1.0;

        if self.clustering.k == 0 {
            return Err(EngineError::Config("CLUSTERING_K must be >= 1".to_string()));
        }
        if self.clustering.max_iterations == 0 {
            return Err(EngineError::Config(
                "CLUSTERING_MAX_ITERATIONS must be >= 1".to_string(),
            ));
        }
        if self.similarity.sample_size == 0 {
            return Err(EngineError::Config(
                "SIMILARITY_SAMPLE_SIZE must be >= 1".to_string(),
            ));
        }
        for (name, ratio) in [
            ("SIMILARITY_DISTINCT_RATIO", self.similarity.distinct_ratio),
            ("SIMILARITY_COVERAGE_RATIO", self.similarity.coverage_ratio),
            ("SIMILARITY_DOMINANT_RATIO", self.similarity.dominant_ratio),
            (
                "HYBRID_POSITIVE_RATING_RATIO",
                f64::from(self.hybrid.positive_rating_ratio),
            ),
        ] {
            if !ratio_ok(ratio) {
                return Err(EngineError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.hybrid.similarity_threshold) {
            return Err(EngineError::Config(format!(
                "HYBRID_SIMILARITY_THRESHOLD must be in [0, 100], got {}",
                self.hybrid.similarity_threshold
            )));
        }
        Ok(())
    }
}
