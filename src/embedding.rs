//! Content-addressed embedding cache and the vector math used by the filter.
//!
//! Entries are keyed by a SHA-256 hash of normalized text and are write-once:
//! the first vector stored for a key wins and is never updated in place, so
//! the cache is safe to share across concurrent runs. Vectors are
//! L2-normalized before insertion, which reduces cosine similarity to a dot
//! product everywhere downstream.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::openai::OpenAI;

#[derive(Clone, Default)]
pub struct EmbeddingCache {
  entries: Arc<RwLock<HashMap<String, Arc<Vec<f32>>>>>,
}

impl EmbeddingCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stable key for a text: SHA-256 over the trimmed, lowercased content.
  pub fn content_key(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
  }

  pub async fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
    self.entries.read().await.get(key).cloned()
  }

  /// Write-once insert: if the key is already present, the existing vector is
  /// returned and the new one discarded.
  pub async fn insert(&self, key: String, vector: Vec<f32>) -> Arc<Vec<f32>> {
    let mut entries = self.entries.write().await;
    entries.entry(key).or_insert_with(|| Arc::new(vector)).clone()
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }
}

/// Fetch an embedding through the cache: hash the text, return a hit, or call
/// the oracle, normalize, and store.
pub async fn embed_cached(
  oa: &OpenAI,
  cache: &EmbeddingCache,
  text: &str,
) -> Result<Arc<Vec<f32>>, String> {
  let key = EmbeddingCache::content_key(text);
  if let Some(v) = cache.get(&key).await {
    debug!(target: "pipeline", key = %&key[..12], "Embedding cache hit");
    return Ok(v);
  }
  let mut vector = oa.embed(text).await?;
  l2_normalize(&mut vector);
  Ok(cache.insert(key, vector).await)
}

/// Scale to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
  let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 0.0 {
    for x in v.iter_mut() {
      *x /= norm;
    }
  }
}

/// Cosine similarity of unit vectors: a plain dot product.
/// Mismatched lengths compare as completely dissimilar.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_key_normalizes_case_and_whitespace() {
    let a = EmbeddingCache::content_key("  What is Osmosis?  ");
    let b = EmbeddingCache::content_key("what is osmosis?");
    let c = EmbeddingCache::content_key("what is diffusion?");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[tokio::test]
  async fn insert_is_write_once() {
    let cache = EmbeddingCache::new();
    let key = EmbeddingCache::content_key("some text");
    let first = cache.insert(key.clone(), vec![1.0, 0.0]).await;
    let second = cache.insert(key.clone(), vec![0.0, 1.0]).await;
    assert_eq!(first.as_slice(), second.as_slice());
    assert_eq!(cache.get(&key).await.expect("present").as_slice(), &[1.0, 0.0]);
    assert_eq!(cache.len().await, 1);
  }

  #[test]
  fn normalize_then_cosine() {
    let mut a = vec![3.0, 4.0];
    l2_normalize(&mut a);
    assert!((a.iter().map(|x| x * x).sum::<f32>() - 1.0).abs() < 1e-6);

    let mut b = vec![3.0, 4.0];
    l2_normalize(&mut b);
    assert!((cosine(&a, &b) - 1.0).abs() < 1e-6);

    let mut c = vec![-4.0, 3.0];
    l2_normalize(&mut c);
    assert!(cosine(&a, &c).abs() < 1e-6);

    // zero vector stays put, mismatched lengths are dissimilar
    let mut z = vec![0.0, 0.0];
    l2_normalize(&mut z);
    assert_eq!(z, vec![0.0, 0.0]);
    assert_eq!(cosine(&a, &[1.0]), 0.0);
  }
}
