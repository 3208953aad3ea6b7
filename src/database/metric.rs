use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Distance metric used for similarity search.
///
/// Unknown names deserialize to [`DistanceMetric::Cosine`] instead of failing,
/// so a typo in the configuration degrades to the default ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceMetric {
    #[inline]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cosine" => Self::Cosine,
            "euclidean" => Self::Euclidean,
            "inner_product" => Self::InnerProduct,
            other => {
                warn!("Unknown distance metric '{}', falling back to cosine", other);
                Self::Cosine
            }
        }
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::InnerProduct => "inner_product",
        }
    }

    /// pgvector distance operator for this metric
    #[inline]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::Euclidean => "<->",
            Self::InnerProduct => "<#>",
        }
    }
}

impl From<String> for DistanceMetric {
    #[inline]
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<DistanceMetric> for String {
    #[inline]
    fn from(value: DistanceMetric) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering applied to inner-product results.
///
/// Search results are always ordered by ascending operator value. pgvector's
/// `<#>` yields the negative inner product, so ascending already ranks the
/// closest rows first. `Descending` is for stores whose operator returns the
/// raw similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}
