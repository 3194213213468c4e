//! Bucket ranges, namespaces and filters: everything that maps a hash to an assignment.

use std::hash::{Hash, Hasher};

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

use crate::{hashing::hash, sticky_bucket::get_hash_attribute, Attributes};

/// A half-open `[start, end)` slice of the hash space.
///
/// Serialized as a `[start, end]` pair. Equality and hashing use values rounded to three decimal
/// places so that ranges computed by different runtimes compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, From, Into)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct BucketRange {
    /// Inclusive lower bound.
    pub start: f64,
    /// Exclusive upper bound.
    pub end: f64,
}

impl BucketRange {
    /// Create a new range.
    pub fn new(start: f64, end: f64) -> BucketRange {
        BucketRange { start, end }
    }

    /// Return `true` if `n` falls into this range.
    pub fn contains(&self, n: f64) -> bool {
        n >= self.start && n < self.end
    }

    fn rounded(&self) -> (i64, i64) {
        (round3(self.start), round3(self.end))
    }
}

fn round3(x: f64) -> i64 {
    (x * 1000.0).round() as i64
}

impl PartialEq for BucketRange {
    fn eq(&self, other: &Self) -> bool {
        self.rounded() == other.rounded()
    }
}

impl Eq for BucketRange {}

impl Hash for BucketRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rounded().hash(state);
    }
}

/// Deprecated namespace: `[id, start, end]`. Users whose namespace hash falls outside
/// `[start, end)` are excluded from the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From, Into)]
#[serde(from = "(String, f64, f64)", into = "(String, f64, f64)")]
pub struct Namespace {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub start: f64,
    #[allow(missing_docs)]
    pub end: f64,
}

/// Mutually-exclusive targeting by hash: a user passes a filter if their hash under `seed` falls in
/// one of `ranges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Filter {
    pub seed: String,
    #[serde(default)]
    pub ranges: Vec<BucketRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<i64>,
}

/// `n` weights of `1/n` each. Empty for `n == 0`.
pub fn get_equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Lay `num_variations` ranges out over `[0, 1)`.
///
/// Each range is `coverage * weight` long and starts where the previous weight ended, so changing
/// coverage does not move users between variations. Weights that are missing, of the wrong length,
/// or that do not sum to 1 (±0.01) are replaced with equal weights.
pub fn get_bucket_ranges(
    num_variations: usize,
    coverage: f64,
    weights: Option<&[f64]>,
) -> Vec<BucketRange> {
    let coverage = if coverage.is_nan() {
        1.0
    } else {
        coverage.clamp(0.0, 1.0)
    };

    let weights = match weights {
        Some(weights) if weights.len() == num_variations => {
            let total: f64 = weights.iter().sum();
            if (0.99..=1.01).contains(&total) {
                weights.to_vec()
            } else {
                get_equal_weights(num_variations)
            }
        }
        _ => get_equal_weights(num_variations),
    };

    let mut cumulative = 0.0;
    weights
        .into_iter()
        .map(|weight| {
            let start = cumulative;
            cumulative += weight;
            BucketRange::new(start, start + coverage * weight)
        })
        .collect()
}

/// Return `true` if `n` is in `[range.start, range.end)`.
pub fn in_range(n: f64, range: &BucketRange) -> bool {
    range.contains(n)
}

/// Index of the first range containing `n`, or `None` if the user falls outside all of them.
pub fn choose_variation(n: f64, ranges: &[BucketRange]) -> Option<usize> {
    ranges.iter().position(|range| range.contains(n))
}

/// Check whether a hash value falls into the namespace's slice.
pub fn in_namespace(hash_value: &str, namespace: &Namespace) -> bool {
    match hash(&format!("__{}", namespace.id), hash_value, 1) {
        Some(n) => n >= namespace.start && n < namespace.end,
        None => false,
    }
}

/// Return `true` if any filter excludes the user.
pub fn is_filtered_out(filters: &[Filter], attributes: &Attributes) -> bool {
    filters.iter().any(|filter| {
        let hash_attribute = get_hash_attribute(filter.attribute.as_deref(), None, attributes);
        if hash_attribute.value.is_empty() {
            return true;
        }
        match hash(
            &filter.seed,
            &hash_attribute.value,
            filter.hash_version.unwrap_or(2),
        ) {
            Some(n) => !filter.ranges.iter().any(|range| range.contains(n)),
            None => true,
        }
    })
}

/// Percentage rollout check used by force rules.
///
/// With neither `range` nor `coverage` everyone is included. An explicit range takes precedence
/// over coverage.
pub fn is_included_in_rollout(
    attributes: &Attributes,
    seed: &str,
    hash_attribute: Option<&str>,
    fallback_attribute: Option<&str>,
    range: Option<&BucketRange>,
    coverage: Option<f64>,
    hash_version: Option<i64>,
) -> bool {
    if range.is_none() && coverage.is_none() {
        return true;
    }
    if range.is_none() && coverage == Some(0.0) {
        return false;
    }

    let hash_attribute = get_hash_attribute(hash_attribute, fallback_attribute, attributes);
    if hash_attribute.value.is_empty() {
        return false;
    }

    let Some(n) = hash(seed, &hash_attribute.value, hash_version.unwrap_or(1)) else {
        return false;
    };

    match (range, coverage) {
        (Some(range), _) => range.contains(n),
        (None, Some(coverage)) => n <= coverage,
        (None, None) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    fn attributes(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equal_weights() {
        assert_eq!(get_equal_weights(0), Vec::<f64>::new());
        assert_eq!(get_equal_weights(1), vec![1.0]);
        assert_eq!(get_equal_weights(4), vec![0.25; 4]);
        for n in 1..20 {
            let total: f64 = get_equal_weights(n).iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "n = {n}");
        }
    }

    #[test]
    fn bucket_ranges_with_coverage_and_weights() {
        assert_eq!(
            get_bucket_ranges(2, 1.0, None),
            vec![BucketRange::new(0.0, 0.5), BucketRange::new(0.5, 1.0)]
        );
        assert_eq!(
            get_bucket_ranges(2, 0.5, None),
            vec![BucketRange::new(0.0, 0.25), BucketRange::new(0.5, 0.75)]
        );
        assert_eq!(
            get_bucket_ranges(3, 0.2, Some(&[0.2, 0.3, 0.5])),
            vec![
                BucketRange::new(0.0, 0.04),
                BucketRange::new(0.2, 0.26),
                BucketRange::new(0.5, 0.6)
            ]
        );
    }

    #[test]
    fn bucket_ranges_fall_back_to_equal_weights() {
        let equal = get_bucket_ranges(2, 1.0, None);
        // wrong length
        assert_eq!(get_bucket_ranges(2, 1.0, Some(&[0.4, 0.3, 0.3])), equal);
        // wrong sum
        assert_eq!(get_bucket_ranges(2, 1.0, Some(&[0.7, 0.6])), equal);
        // coverage is clamped
        assert_eq!(get_bucket_ranges(2, 1.5, None), equal);
        assert_eq!(
            get_bucket_ranges(2, -0.2, None),
            vec![BucketRange::new(0.0, 0.0), BucketRange::new(0.5, 0.5)]
        );
    }

    #[test]
    fn full_coverage_ranges_are_contiguous() {
        for n in 1..10 {
            let ranges = get_bucket_ranges(n, 1.0, None);
            assert_eq!(ranges.len(), n);
            assert_eq!(ranges[0].start, 0.0);
            for pair in ranges.windows(2) {
                assert!((pair[0].end - pair[1].start).abs() < 1e-9);
            }
            assert!((ranges[n - 1].end - 1.0).abs() < 1e-9);

            let mut hit = HashSet::new();
            for step in 0..1000 {
                if let Some(i) = choose_variation(step as f64 / 1000.0, &ranges) {
                    hit.insert(i);
                }
            }
            assert_eq!(hit.len(), n);
        }
    }

    #[test]
    fn choose_variation_picks_first_containing_range() {
        let ranges = [BucketRange::new(0.0, 0.5), BucketRange::new(0.5, 1.0)];
        assert_eq!(choose_variation(0.0, &ranges), Some(0));
        assert_eq!(choose_variation(0.5, &ranges), Some(1));
        assert_eq!(choose_variation(0.9999, &ranges), Some(1));
        assert_eq!(choose_variation(1.0, &ranges), None);

        let partial = [BucketRange::new(0.0, 0.25), BucketRange::new(0.5, 0.75)];
        assert_eq!(choose_variation(0.3, &partial), None);
        assert_eq!(choose_variation(0.6, &partial), Some(1));
    }

    #[test]
    fn range_equality_is_rounded() {
        assert_eq!(
            BucketRange::new(0.1 + 0.2, 0.5),
            BucketRange::new(0.3, 0.5000001)
        );
        assert_ne!(BucketRange::new(0.3, 0.5), BucketRange::new(0.301, 0.5));

        let set: HashSet<_> = [BucketRange::new(0.1 + 0.2, 1.0), BucketRange::new(0.3, 1.0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn range_serializes_as_pair() {
        let range: BucketRange = serde_json::from_value(json!([0.25, 0.5])).unwrap();
        assert_eq!(range, BucketRange::new(0.25, 0.5));
        assert_eq!(serde_json::to_value(range).unwrap(), json!([0.25, 0.5]));

        let namespace: Namespace = serde_json::from_value(json!(["ns1", 0.0, 0.4])).unwrap();
        assert_eq!(namespace.id, "ns1");
        assert_eq!(namespace.end, 0.4);
    }

    #[test]
    fn namespace_membership() {
        // namespace hashes for "__ns1": "1" -> 0.852, "2" -> 0.399, "4" -> 0.233
        let namespace = Namespace {
            id: "ns1".to_owned(),
            start: 0.0,
            end: 0.4,
        };
        assert!(!in_namespace("1", &namespace));
        assert!(in_namespace("2", &namespace));
        assert!(in_namespace("4", &namespace));
    }

    #[test]
    fn filters() {
        // hash("exp1", "123", 2) == 0.3022
        let filters = vec![Filter {
            seed: "exp1".to_owned(),
            ranges: vec![BucketRange::new(0.0, 0.5)],
            attribute: None,
            hash_version: None,
        }];
        assert!(!is_filtered_out(&filters, &attributes(json!({"id": "123"}))));
        // hash("exp1", "1", 2) == 0.2721, hash("exp1", "2", 2) == 0.9592
        assert!(!is_filtered_out(&filters, &attributes(json!({"id": "1"}))));
        assert!(is_filtered_out(&filters, &attributes(json!({"id": "2"}))));
        // no hash value
        assert!(is_filtered_out(&filters, &attributes(json!({}))));
        // no filters
        assert!(!is_filtered_out(&[], &attributes(json!({}))));
    }

    #[test]
    fn rollout() {
        let user = attributes(json!({"id": "1"}));
        // hash("my-feature", "1", 1) == 0.241
        assert!(is_included_in_rollout(&user, "my-feature", None, None, None, None, None));
        assert!(!is_included_in_rollout(&user, "my-feature", None, None, None, Some(0.0), None));
        assert!(is_included_in_rollout(&user, "my-feature", None, None, None, Some(0.3), None));
        assert!(!is_included_in_rollout(&user, "my-feature", None, None, None, Some(0.2), None));
        assert!(is_included_in_rollout(
            &user,
            "my-feature",
            None,
            None,
            Some(&BucketRange::new(0.2, 0.3)),
            Some(0.0),
            None
        ));
        assert!(!is_included_in_rollout(
            &user,
            "my-feature",
            None,
            None,
            Some(&BucketRange::new(0.3, 1.0)),
            None,
            None
        ));
        // missing hash attribute
        assert!(!is_included_in_rollout(
            &attributes(json!({})),
            "my-feature",
            None,
            None,
            None,
            Some(1.0),
            None
        ));
        // fallback attribute
        assert!(is_included_in_rollout(
            &attributes(json!({"deviceId": "1"})),
            "my-feature",
            None,
            Some("deviceId"),
            None,
            Some(0.3),
            None
        ));
    }
}
