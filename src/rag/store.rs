//! VectorStore trait: namespaced vector storage used by the site index.
//!
//! A namespace fixes its dimension and distance metric at creation; every record
//! written to it must match that dimension.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::vector_math;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    DotProduct,
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::DotProduct => "dot_product",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dot_product" => Some(DistanceMetric::DotProduct),
            "cosine" => Some(DistanceMetric::Cosine),
            "euclidean" => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }

    /// Similarity of `candidate` to `query`; higher is closer for every metric.
    pub fn score(&self, query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
        match self {
            DistanceMetric::DotProduct => vector_math::dot_product(query, candidate),
            DistanceMetric::Cosine => vector_math::cosine_similarity(query, candidate),
            DistanceMetric::Euclidean => vector_math::negative_euclidean(query, candidate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn namespace_info(&self, name: &str) -> Result<Option<NamespaceInfo>, ApiError>;

    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ApiError>;

    /// Fails when the namespace already exists.
    async fn create_namespace(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), ApiError>;

    /// Inserts or replaces records by id. Returns the number written.
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize, ApiError>;

    /// Top `k` records by the namespace's metric, best first.
    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError>;

    async fn count(&self, namespace: &str) -> Result<usize, ApiError>;

    /// Removes a namespace and its records. Returns whether it existed.
    async fn drop_namespace(&self, name: &str) -> Result<bool, ApiError>;

    /// Atomically replaces `target` (if present) with the contents of `staging`.
    /// `staging` no longer exists afterwards.
    async fn promote_namespace(&self, staging: &str, target: &str) -> Result<(), ApiError>;

    async fn namespace_exists(&self, name: &str) -> Result<bool, ApiError> {
        Ok(self.namespace_info(name).await?.is_some())
    }
}
