use std::sync::Arc;

use thiserror::Error;

/// Result type for fallible `growthbook` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned from the public API.
///
/// Feature and experiment evaluation never fails: problems detected while evaluating are logged and
/// surface as a [`FeatureResult`](crate::FeatureResult) with an appropriate source instead. These
/// errors are reserved for inputs supplied by the caller.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Feature, saved group or attribute payload is not valid JSON or has an unexpected shape.
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    #[error("invalid JSON payload")]
    InvalidJson(#[source] Arc<serde_json::Error>),
    /// Attributes must be a JSON object.
    #[error("attributes must be a JSON object")]
    AttributesNotAnObject,
    /// Page URL could not be parsed.
    #[error("invalid url")]
    InvalidUrl(#[source] url::ParseError),
    /// Feature value could not be converted to the requested type.
    #[error("feature value has unexpected type")]
    TypeMismatch(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson(Arc::new(value))
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value)
    }
}

/// Internal failures that stop evaluation of a single feature. These are never returned to the
/// caller and are mapped to [`FeatureResult::UnknownFeature`](crate::FeatureResult).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvaluationFailure {
    #[error("feature is not defined")]
    UnknownFeature,
    #[error("feature definition failed to parse")]
    FeatureParseFailed,
}
