use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type UserId = u32;
pub type ItemId = u32;

/// A user's scores keyed by item, or the mean scores of a cluster centroid
pub type ItemScores = BTreeMap<ItemId, f32>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub score: f32,
}

impl Rating {
    pub fn new(user_id: UserId, item_id: ItemId, score: f32) -> Self {
        Self {
            user_id,
            item_id,
            score,
        }
    }
}

/// Collects ratings into an item -> score map (last one wins on duplicates)
pub fn to_item_scores(ratings: &[Rating]) -> ItemScores {
    ratings.iter().map(|r| (r.item_id, r.score)).collect()
}

/// An item paired with a predicted or observed score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommenderKind {
    Collaborative,
    Hybrid,
}

impl fmt::Display for RecommenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommenderKind::Collaborative => write!(f, "collaborative"),
            RecommenderKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Values of one catalog column for one item; every value shares one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValues {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl AttributeValues {
    pub fn len(&self) -> usize {
        match self {
            AttributeValues::Bool(v) => v.len(),
            AttributeValues::Int(v) => v.len(),
            AttributeValues::Float(v) => v.len(),
            AttributeValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, AttributeValues::Text(_))
    }

    /// Display form of the value at `index`, used to tally distinct values
    pub fn key(&self, index: usize) -> Option<String> {
        match self {
            AttributeValues::Bool(v) => v.get(index).map(|b| b.to_string()),
            AttributeValues::Int(v) => v.get(index).map(|i| i.to_string()),
            AttributeValues::Float(v) => v.get(index).map(|f| f.to_string()),
            AttributeValues::Text(v) => v.get(index).cloned(),
        }
    }

    /// Exact equality of two non-text values; values of different types never match
    pub fn value_eq(&self, index: usize, other: &AttributeValues, other_index: usize) -> bool {
        match (self, other) {
            (AttributeValues::Bool(a), AttributeValues::Bool(b)) => {
                a.get(index).is_some() && a.get(index) == b.get(other_index)
            }
            (AttributeValues::Int(a), AttributeValues::Int(b)) => {
                a.get(index).is_some() && a.get(index) == b.get(other_index)
            }
            (AttributeValues::Float(a), AttributeValues::Float(b)) => {
                a.get(index).is_some() && a.get(index) == b.get(other_index)
            }
            _ => false,
        }
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self {
            AttributeValues::Text(v) => v.get(index).map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttribute {
    pub name: String,
    pub values: AttributeValues,
}

impl ItemAttribute {
    pub fn new(name: impl Into<String>, values: AttributeValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub name: String,
    pub description: String,
    /// Aggregate rating, recomputed from the rating store
    pub score: f32,
    pub attributes: Vec<ItemAttribute>,
}

impl Item {
    pub fn new(item_id: ItemId, name: impl Into<String>, attributes: Vec<ItemAttribute>) -> Self {
        Self {
            item_id,
            name: name.into(),
            description: String::new(),
            score: 0.0,
            attributes,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn attribute(&self, index: usize) -> Option<&ItemAttribute> {
        self.attributes.get(index)
    }
}

/// Maximum rating value inferred from observed data.
///
/// Starts at 5 and only ever moves up: to 10 once a score above 5 is seen,
/// to 100 once a score above 10 is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RatingScale {
    #[default]
    Five,
    Ten,
    Hundred,
}

impl RatingScale {
    pub fn max(&self) -> f32 {
        match self {
            RatingScale::Five => 5.0,
            RatingScale::Ten => 10.0,
            RatingScale::Hundred => 100.0,
        }
    }

    /// Scale after observing `score`; never lower than `self`
    pub fn observe(self, score: f32) -> Self {
        let seen = if score > 10.0 {
            RatingScale::Hundred
        } else if score > 5.0 {
            RatingScale::Ten
        } else {
            RatingScale::Five
        };
        self.max_with(seen)
    }

    fn max_with(self, other: Self) -> Self {
        if other.max() > self.max() {
            other
        } else {
            self
        }
    }
}

/// Cache key for a clustering result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub k: usize,
    /// Number of known users when the clustering was computed
    pub dataset_size: usize,
}

impl ClusterKey {
    pub fn new(k: usize, dataset_size: usize) -> Self {
        Self { k, dataset_size }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k={}/users={}", self.k, self.dataset_size)
    }
}

/// Immutable result of a KMeans run: user groups plus their centroids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub key: ClusterKey,
    pub groups: Vec<BTreeSet<UserId>>,
    pub centroids: Vec<ItemScores>,
    pub iterations: usize,
    /// Rating store generation the input was read at
    #[serde(default)]
    pub generation: u64,
    pub computed_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    /// Number of groups actually built (below `key.k` only with partial seeding)
    pub fn effective_k(&self) -> usize {
        self.groups.len()
    }

    pub fn group_of(&self, user_id: UserId) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(&user_id))
    }

    /// Members of the user's group, excluding the user
    pub fn peers_of(&self, user_id: UserId) -> Option<Vec<UserId>> {
        self.group_of(user_id).map(|idx| {
            self.groups[idx]
                .iter()
                .copied()
                .filter(|&u| u != user_id)
                .collect()
        })
    }

    pub fn user_count(&self) -> usize {
        self.groups.iter().map(BTreeSet::len).sum()
    }
}
