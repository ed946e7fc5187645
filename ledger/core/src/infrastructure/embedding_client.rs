// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! Two [`EmbeddingProvider`] implementations:
//!
//! - [`HttpEmbeddingClient`] talks to the sentence-transformers sidecar
//!   (`POST {url}/embedding` with `{"text": ...}`, answered by a bare JSON
//!   array of floats).
//! - [`HashingEmbedder`] is a deterministic feature-hashing embedder for
//!   development and tests. Texts sharing words land close together.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::embedding::{EmbeddingError, EmbeddingProvider};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str, timeout: Duration, dimensions: usize) -> Result<Self, EmbeddingError> {
        let base = url::Url::parse(base_url.trim())
            .map_err(|e| EmbeddingError::Unavailable(format!("invalid embedding url '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embedding", base.as_str().trim_end_matches('/')),
            dimensions,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::Empty);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest { text })
            .send()
            .await
            .map_err(|e| {
                counter!("evolve_embedding_requests_total", "outcome" => "unavailable").increment(1);
                warn!(endpoint = %self.endpoint, "Embedding request failed: {}", e);
                EmbeddingError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            counter!("evolve_embedding_requests_total", "outcome" => "error_status").increment(1);
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "Embedding service returned error");
            return Err(EmbeddingError::Unavailable(format!("status {}: {}", status, body)));
        }

        let embedding: Vec<f32> = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if embedding.len() != self.dimensions {
            counter!("evolve_embedding_requests_total", "outcome" => "invalid").increment(1);
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        counter!("evolve_embedding_requests_total", "outcome" => "ok").increment(1);
        debug!(dimensions = embedding.len(), "Embedded text");
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Bag-of-words feature hashing, L2-normalised.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// `None` when no token survives, so the vector would have no direction.
    fn vectorize(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return None;
        }
        for x in vector.iter_mut() {
            *x /= norm;
        }
        Some(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::Empty);
        }
        self.vectorize(text).ok_or(EmbeddingError::Empty)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
