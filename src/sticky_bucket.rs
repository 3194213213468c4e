//! Sticky bucketing: persisting experiment assignments so users keep their variation when an
//! experiment's weights or targeting change.

use std::{
    collections::{BTreeSet, HashMap},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{
    models::{Feature, Features, VariationMeta},
    value::attribute_to_hash_value,
    Attributes,
};

/// Assignments persisted for one `(attribute name, attribute value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyAssignmentsDocument {
    #[allow(missing_docs)]
    pub attribute_name: String,
    #[allow(missing_docs)]
    pub attribute_value: String,
    /// `experimentKey__bucketVersion` to variation key.
    pub assignments: HashMap<String, String>,
}

impl StickyAssignmentsDocument {
    /// Key under which the document is stored: `attributeName||attributeValue`.
    pub fn key(&self) -> String {
        sticky_bucket_document_key(&self.attribute_name, &self.attribute_value)
    }
}

/// Documents keyed by `attributeName||attributeValue`.
pub type StickyAssignmentsDocuments = HashMap<String, StickyAssignmentsDocument>;

/// Storage for sticky bucket assignments.
///
/// Implementations are called synchronously from evaluation and should be fast.
pub trait StickyBucketService {
    /// Look up the document for a single attribute.
    fn get_assignments(
        &self,
        attribute_name: &str,
        attribute_value: &str,
    ) -> Option<StickyAssignmentsDocument>;

    /// Insert or replace a document.
    fn save_assignments(&self, doc: StickyAssignmentsDocument);

    /// Load the documents for every identifier attribute of a user. Attributes with an empty
    /// value are skipped.
    fn get_all_assignments(
        &self,
        attributes: &HashMap<String, String>,
    ) -> StickyAssignmentsDocuments {
        attributes
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(name, value)| self.get_assignments(name, value))
            .map(|doc| (doc.key(), doc))
            .collect()
    }
}

/// [`StickyBucketService`] keeping documents in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStickyBucketService {
    docs: RwLock<StickyAssignmentsDocuments>,
}

impl InMemoryStickyBucketService {
    #[allow(missing_docs)]
    pub fn new() -> InMemoryStickyBucketService {
        InMemoryStickyBucketService::default()
    }
}

impl StickyBucketService for InMemoryStickyBucketService {
    fn get_assignments(
        &self,
        attribute_name: &str,
        attribute_value: &str,
    ) -> Option<StickyAssignmentsDocument> {
        // read() only fails if a writer panicked while holding the lock. Treat it as a miss instead
        // of crashing the app.
        let docs = self.docs.read().ok()?;
        docs.get(&sticky_bucket_document_key(attribute_name, attribute_value))
            .cloned()
    }

    fn save_assignments(&self, doc: StickyAssignmentsDocument) {
        let key = doc.key();
        match self.docs.write() {
            Ok(mut docs) => {
                docs.insert(key, doc);
            }
            Err(_) => {
                log::warn!(target: "growthbook",
                           key:display = key;
                           "sticky bucket store lock is poisoned, assignment not saved");
            }
        }
    }
}

pub(crate) fn sticky_bucket_document_key(attribute_name: &str, attribute_value: &str) -> String {
    format!("{attribute_name}||{attribute_value}")
}

/// Resolved hash attribute of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashAttribute {
    /// Attribute name actually used (primary or fallback).
    pub attribute: String,
    /// Stringified attribute value. Empty if the user has no value.
    pub value: String,
}

/// Resolve the attribute to hash on: `attribute` (default `"id"`), or `fallback` if the primary
/// value is empty and the fallback has one.
pub fn get_hash_attribute(
    attribute: Option<&str>,
    fallback: Option<&str>,
    attributes: &Attributes,
) -> HashAttribute {
    let attribute = attribute.filter(|a| !a.is_empty()).unwrap_or("id");
    let value = attributes
        .get(attribute)
        .map(attribute_to_hash_value)
        .unwrap_or_default();

    if value.is_empty() {
        if let Some(fallback) = fallback.filter(|f| !f.is_empty()) {
            let fallback_value = attributes
                .get(fallback)
                .map(attribute_to_hash_value)
                .unwrap_or_default();
            if !fallback_value.is_empty() {
                return HashAttribute {
                    attribute: fallback.to_owned(),
                    value: fallback_value,
                };
            }
        }
    }

    HashAttribute {
        attribute: attribute.to_owned(),
        value,
    }
}

/// `key__version`, with the version defaulting to `0`.
pub fn get_sticky_bucket_experiment_key(
    experiment_key: &str,
    bucket_version: Option<i64>,
) -> String {
    format!("{experiment_key}__{}", bucket_version.unwrap_or(0))
}

/// Merge the assignments stored for the user's primary and fallback hash attributes. Primary
/// assignments win.
///
/// If `docs` hold a document for the fallback attribute with a value that no longer matches the
/// user, the cached documents are stale and no assignments are returned.
pub fn get_sticky_bucket_assignments(
    docs: &StickyAssignmentsDocuments,
    attributes: &Attributes,
    hash_attribute: Option<&str>,
    fallback_attribute: Option<&str>,
) -> HashMap<String, String> {
    let primary = get_hash_attribute(hash_attribute, None, attributes);
    let primary_key = sticky_bucket_document_key(&primary.attribute, &primary.value);

    let fallback = fallback_attribute
        .filter(|f| !f.is_empty())
        .map(|f| get_hash_attribute(Some(f), None, attributes));

    if let Some(fallback) = &fallback {
        let stale = docs.values().any(|doc| {
            doc.attribute_name == fallback.attribute && doc.attribute_value != fallback.value
        });
        if stale {
            log::debug!(target: "growthbook",
                        attribute:display = fallback.attribute;
                        "fallback attribute changed, ignoring cached sticky buckets");
            return HashMap::new();
        }
    }

    let mut assignments = HashMap::new();
    if let Some(fallback) = fallback.filter(|f| !f.value.is_empty()) {
        let fallback_key = sticky_bucket_document_key(&fallback.attribute, &fallback.value);
        if let Some(doc) = docs.get(&fallback_key) {
            assignments.extend(doc.assignments.clone());
        }
    }
    if let Some(doc) = docs.get(&primary_key) {
        assignments.extend(doc.assignments.clone());
    }
    assignments
}

/// Outcome of a sticky bucket lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickyBucketVariation {
    /// Previously assigned variation index, if any.
    pub variation: Option<usize>,
    /// The user was assigned under a bucket version older than the experiment's minimum and must
    /// be excluded.
    pub version_is_blocked: bool,
}

/// Experiment fields relevant to a sticky bucket lookup.
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct StickyBucketExperiment<'a> {
    pub key: &'a str,
    pub bucket_version: Option<i64>,
    pub min_bucket_version: Option<i64>,
    pub meta: &'a [VariationMeta],
    pub hash_attribute: Option<&'a str>,
    pub fallback_attribute: Option<&'a str>,
}

/// Find a previously persisted variation for the experiment.
pub fn get_sticky_bucket_variation(
    experiment: &StickyBucketExperiment<'_>,
    docs: &StickyAssignmentsDocuments,
    attributes: &Attributes,
) -> StickyBucketVariation {
    let assignments = get_sticky_bucket_assignments(
        docs,
        attributes,
        experiment.hash_attribute,
        experiment.fallback_attribute,
    );

    let min_bucket_version = experiment.min_bucket_version.unwrap_or(0);
    if min_bucket_version > 0 {
        let blocked = (0..min_bucket_version).any(|version| {
            assignments
                .contains_key(&get_sticky_bucket_experiment_key(experiment.key, Some(version)))
        });
        if blocked {
            return StickyBucketVariation {
                variation: None,
                version_is_blocked: true,
            };
        }
    }

    let key = get_sticky_bucket_experiment_key(experiment.key, experiment.bucket_version);
    let variation = assignments.get(&key).and_then(|variation_key| {
        experiment
            .meta
            .iter()
            .position(|meta| meta.key.as_deref() == Some(variation_key.as_str()))
    });

    StickyBucketVariation {
        variation,
        version_is_blocked: false,
    }
}

/// Document produced by merging new assignments into a user's existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStickyBucketDocument {
    /// `attributeName||attributeValue`.
    pub key: String,
    #[allow(missing_docs)]
    pub doc: StickyAssignmentsDocument,
    /// Whether the merged assignments differ from the stored ones (i.e. the document must be
    /// saved).
    pub changed: bool,
}

/// Merge `new_assignments` into the stored document for `(attribute_name, attribute_value)`.
pub fn generate_sticky_bucket_assignment_doc(
    docs: &StickyAssignmentsDocuments,
    attribute_name: &str,
    attribute_value: &str,
    new_assignments: HashMap<String, String>,
) -> GeneratedStickyBucketDocument {
    let key = sticky_bucket_document_key(attribute_name, attribute_value);
    let existing = docs
        .get(&key)
        .map(|doc| doc.assignments.clone())
        .unwrap_or_default();

    let mut assignments = existing.clone();
    assignments.extend(new_assignments);
    let changed = assignments != existing;

    GeneratedStickyBucketDocument {
        key,
        doc: StickyAssignmentsDocument {
            attribute_name: attribute_name.to_owned(),
            attribute_value: attribute_value.to_owned(),
            assignments,
        },
        changed,
    }
}

/// Attributes that sticky bucket documents can be keyed by: the hash and fallback attributes of
/// every experiment rule.
pub fn derive_sticky_bucket_identifier_attributes(features: &Features) -> BTreeSet<String> {
    features
        .values()
        .filter_map(|feature| Option::<&Feature>::from(feature))
        .flat_map(|feature| feature.rules.iter())
        .filter(|rule| rule.variations.is_some())
        .flat_map(|rule| {
            let hash_attribute = rule
                .hash_attribute
                .clone()
                .unwrap_or_else(|| "id".to_owned());
            std::iter::once(hash_attribute).chain(rule.fallback_attribute.clone())
        })
        .collect()
}

/// Stringified values of the identifier attributes for a user.
pub(crate) fn get_sticky_bucket_attributes<'a>(
    identifiers: impl IntoIterator<Item = &'a String>,
    attributes: &Attributes,
) -> HashMap<String, String> {
    identifiers
        .into_iter()
        .map(|name| {
            let value = get_hash_attribute(Some(name), None, attributes).value;
            (name.clone(), value)
        })
        .collect()
}
