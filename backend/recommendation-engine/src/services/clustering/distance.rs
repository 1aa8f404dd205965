use crate::models::ItemScores;

/// Distance between two profiles that share no rated item.
///
/// Larger than any real distance, smaller than `UNCOMPARED_DISTANCE`, so a
/// profile with no overlap still ends up assigned to some centroid.
pub const NO_OVERLAP_DISTANCE: f64 = 999_999_999.0;

/// Starting value of a nearest-centroid search
pub const UNCOMPARED_DISTANCE: f64 = f64::MAX;

/// Euclidean distance over the items both profiles rated.
///
/// Items rated by only one side contribute nothing, which makes this a
/// non-metric (the triangle inequality can fail).
pub fn distance(a: &ItemScores, b: &ItemScores) -> f64 {
    // Walk the smaller map; shared keys come out ascending either way.
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let mut sum = 0.0_f64;
    let mut shared = false;
    for (item_id, &score) in small {
        if let Some(&other) = large.get(item_id) {
            let diff = f64::from(score) - f64::from(other);
            sum += diff * diff;
            shared = true;
        }
    }

    if shared {
        sum.sqrt()
    } else {
        NO_OVERLAP_DISTANCE
    }
}

/// Index and distance of the closest centroid; ties go to the lowest index
pub fn nearest_centroid(profile: &ItemScores, centroids: &[ItemScores]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    let mut best_distance = UNCOMPARED_DISTANCE;

    for (idx, centroid) in centroids.iter().enumerate() {
        let d = distance(profile, centroid);
        if d < best_distance {
            best_distance = d;
            best = Some((idx, d));
        }
    }

    best
}
