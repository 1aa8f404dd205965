//! Error types for the recommendation engine

use crate::models::{ItemId, UserId};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// No ratings exist for this user
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// Item is not part of the catalog
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    /// Rating to remove or edit does not exist
    #[error("Rating does not exist: user {user_id}, item {item_id}")]
    UnknownRating { user_id: UserId, item_id: ItemId },

    /// Caller broke a precondition of the engine
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Input the algorithms cannot produce a meaningful answer for
    #[error("Degenerate input: {0}")]
    Degenerate(#[from] DegenerateInput),

    /// Clustering hit the configured iteration cap
    #[error("Clustering did not converge within {iterations} iterations")]
    ConvergenceLimit { iterations: usize },

    /// Clustering ran past its deadline
    #[error("Clustering deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Clustering was cancelled by the caller
    #[error("Clustering cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment variables could not be deserialized
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    /// Blocking worker panicked or was aborted
    #[error("Background job failed: {0}")]
    BackgroundJob(String),
}

/// Inputs that are well-formed but leave an algorithm without an answer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateInput {
    #[error("only {found} of {requested} users qualify as initial centroids")]
    InsufficientSeeds { requested: usize, found: usize },

    #[error("cluster {cluster} lost all members in iteration {iteration}")]
    EmptyCluster { cluster: usize, iteration: usize },

    #[error("ideal DCG is zero, NDCG is undefined")]
    ZeroIdcg,

    #[error("catalog is empty")]
    EmptyCatalog,

    #[error("no evaluation query produced a defined NDCG")]
    NoScoredQueries,
}

impl EngineError {
    /// True for unknown user / item / rating lookups
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownUser(_)
                | EngineError::UnknownItem(_)
                | EngineError::UnknownRating { .. }
        )
    }
}
