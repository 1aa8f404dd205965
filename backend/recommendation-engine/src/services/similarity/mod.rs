// ============================================
// Similarity Engine (content-based)
// ============================================
//
// Scores how alike two catalog items are from their attributes.
//
// Ponderations are computed once per engine from a sample of the catalog.
// An attribute takes part in comparisons (weight 1) only when it splits the
// catalog into a few well-populated value groups:
//
//   - mostly unique values (titles, ids)       -> weight 0
//   - one value covering almost every item      -> weight 0
//   - no group, or too many groups, above the
//     coverage threshold                        -> weight 0

use crate::config::SimilarityConfig;
use crate::error::{DegenerateInput, Result};
use crate::models::{AttributeValues, Item, ItemId};
use crate::store::Catalog;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Returned when an item is compared with itself
pub const SELF_SIMILARITY: f32 = -1.0;

/// A catalog item and its similarity (0-100) to a reference item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub item_id: ItemId,
    pub similarity: f32,
}

/// Per-attribute inclusion weights, indexed like `Item::attributes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ponderations(Vec<f32>);

impl Ponderations {
    /// Computes weights from the first `config.sample_size` items
    pub fn compute(items: &[Item], config: &SimilarityConfig) -> Self {
        let sample = &items[..items.len().min(config.sample_size)];
        let n = sample.len() as f64;
        let distinct_limit = n * config.distinct_ratio;
        let coverage_limit = n * config.coverage_ratio;
        let dominant_limit = n * config.dominant_ratio;

        let attribute_count = sample
            .iter()
            .map(|item| item.attributes.len())
            .max()
            .unwrap_or(0);

        let weights = (0..attribute_count)
            .map(|index| {
                let tally = tally_values(sample, index);
                if tally.len() as f64 > distinct_limit {
                    return 0.0;
                }

                let mut groups = 0usize;
                for &count in tally.values() {
                    let count = count as f64;
                    if count > coverage_limit {
                        groups += 1;
                        if count > dominant_limit {
                            groups = 0;
                            break;
                        }
                    }
                }

                if groups == 0 || groups as f64 > coverage_limit {
                    0.0
                } else {
                    1.0
                }
            })
            .collect();

        Self(weights)
    }

    pub fn weight(&self, index: usize) -> f32 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    pub fn is_included(&self, index: usize) -> bool {
        self.weight(index) > 0.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn included_count(&self) -> usize {
        self.0.iter().filter(|&&w| w > 0.0).count()
    }
}

/// Occurrences of each distinct value (by display key) of one attribute
fn tally_values(sample: &[Item], index: usize) -> HashMap<String, usize> {
    let mut tally: HashMap<String, usize> = HashMap::new();
    for item in sample {
        if let Some(attribute) = item.attribute(index) {
            for value_index in 0..attribute.values.len() {
                if let Some(key) = attribute.values.key(value_index) {
                    *tally.entry(key).or_insert(0) += 1;
                }
            }
        }
    }
    tally
}

/// Jaccard index of the character sets of two strings; 0 if either is empty
pub fn jaccard(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<char> = a.chars().collect();
    let b: HashSet<char> = b.chars().collect();

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f32 / union as f32
}

pub struct SimilarityEngine {
    catalog: Arc<dyn Catalog>,
    ponderations: Ponderations,
}

impl SimilarityEngine {
    /// Builds the engine and its ponderations; an empty catalog is rejected
    pub fn new(catalog: Arc<dyn Catalog>, config: &SimilarityConfig) -> Result<Self> {
        let items = catalog.all_items();
        if items.is_empty() {
            return Err(DegenerateInput::EmptyCatalog.into());
        }

        let ponderations = Ponderations::compute(&items, config);
        info!(
            items = items.len(),
            sampled = items.len().min(config.sample_size),
            attributes = ponderations.len(),
            included = ponderations.included_count(),
            "Ponderations computed"
        );

        Ok(Self {
            catalog,
            ponderations,
        })
    }

    pub fn ponderations(&self) -> &Ponderations {
        &self.ponderations
    }

    /// Similarity in `[0, 100]`, or `SELF_SIMILARITY` for the same item
    pub fn similarity(&self, a: &Item, b: &Item) -> f32 {
        if a.item_id == b.item_id {
            return SELF_SIMILARITY;
        }

        let mut total = 0.0_f32;
        let mut compared = 0usize;

        for index in 0..self.ponderations.len() {
            if !self.ponderations.is_included(index) {
                continue;
            }
            compared += 1;

            let (Some(attr_a), Some(attr_b)) = (a.attribute(index), b.attribute(index)) else {
                continue;
            };
            total += attribute_overlap(&attr_a.values, &attr_b.values);
        }

        if compared == 0 {
            return 0.0;
        }
        (total / compared as f32 * 100.0).clamp(0.0, 100.0)
    }

    /// The `k` most similar other items, most similar first (ties: higher id first)
    pub fn k_nearest(&self, item_id: ItemId, k: usize) -> Result<Vec<Neighbor>> {
        let reference = self.catalog.item(item_id)?;

        let mut neighbors: Vec<Neighbor> = self
            .catalog
            .all_items()
            .iter()
            .filter(|item| item.item_id != item_id)
            .map(|item| Neighbor {
                item_id: item.item_id,
                similarity: self.similarity(&reference, item),
            })
            .collect();

        neighbors.sort_by(|a, b| match b.similarity.total_cmp(&a.similarity) {
            Ordering::Equal => b.item_id.cmp(&a.item_id),
            other => other,
        });
        neighbors.truncate(k);

        debug!(item_id, k, found = neighbors.len(), "k-nearest computed");
        Ok(neighbors)
    }

    /// Full catalog entries of the `n` most similar items
    pub fn similar_items(&self, item_id: ItemId, n: usize) -> Result<Vec<Item>> {
        self.k_nearest(item_id, n)?
            .into_iter()
            .map(|neighbor| self.catalog.item(neighbor.item_id))
            .collect()
    }
}

/// Every value of A against every value of B, normalised by `|A| + |B|`
fn attribute_overlap(a: &AttributeValues, b: &AttributeValues) -> f32 {
    let size = (a.len() + b.len()) as f32;
    if size == 0.0 {
        return 0.0;
    }

    let mut sum = 0.0_f32;
    for i in 0..a.len() {
        for j in 0..b.len() {
            if a.is_text() {
                if let (Some(x), Some(y)) = (a.key(i), b.key(j)) {
                    sum += jaccard(&x, &y) / size;
                }
            } else if a.value_eq(i, b, j) {
                sum += 2.0 / size;
            }
        }
    }
    sum
}
