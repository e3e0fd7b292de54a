use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in pixel coordinates of the
/// normalized frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector produced by an encoder backend.
///
/// The `backend` tag names the backend (and model revision) that produced
/// the vector. Embeddings from different backends are never comparable;
/// the tag is persisted alongside the vector and checked on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub backend: String,
}

impl Embedding {
    pub fn new(values: Vec<f32>, backend: impl Into<String>) -> Self {
        Self {
            values,
            backend: backend.into(),
        }
    }

    /// Cosine similarity between two embeddings, in [-1, 1].
    ///
    /// Always processes all dimensions; a zero-norm operand yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Comparison semantics paired with an encoder backend.
///
/// A backend's embeddings are only meaningful under its own metric; the
/// pairing is fixed at configuration time and never mixed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Euclidean distance — lower is better, match when score <= cutoff.
    Distance,
    /// Cosine similarity — higher is better, match when score >= cutoff.
    Similarity,
}

impl Metric {
    /// Score a probe against a reference embedding under this metric.
    pub fn score(&self, probe: &Embedding, reference: &Embedding) -> f32 {
        match self {
            Metric::Distance => probe.euclidean_distance(reference),
            Metric::Similarity => probe.similarity(reference),
        }
    }

    /// Whether a score satisfies the configured cutoff.
    pub fn accepts(&self, score: f32, cutoff: f32) -> bool {
        match self {
            Metric::Distance => score <= cutoff,
            Metric::Similarity => score >= cutoff,
        }
    }

    /// Whether `candidate` is strictly better than `incumbent`.
    pub fn improves(&self, candidate: f32, incumbent: f32) -> bool {
        match self {
            Metric::Distance => candidate < incumbent,
            Metric::Similarity => candidate > incumbent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding::new(values, "test")
    }

    #[test]
    fn test_similarity_identical() {
        let a = emb(vec![1.0, 0.0, 0.0]);
        let b = emb(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal() {
        let a = emb(vec![1.0, 0.0]);
        let b = emb(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        let a = emb(vec![0.0, 0.0]);
        let b = emb(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = emb(vec![0.0, 0.0]);
        let b = emb(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_accepts_distance() {
        assert!(Metric::Distance.accepts(0.4, 0.5));
        assert!(Metric::Distance.accepts(0.5, 0.5));
        assert!(!Metric::Distance.accepts(0.6, 0.5));
    }

    #[test]
    fn test_metric_accepts_similarity() {
        assert!(Metric::Similarity.accepts(0.9, 0.85));
        assert!(Metric::Similarity.accepts(0.85, 0.85));
        assert!(!Metric::Similarity.accepts(0.8, 0.85));
    }

    #[test]
    fn test_metric_improves() {
        assert!(Metric::Distance.improves(0.2, 0.3));
        assert!(!Metric::Distance.improves(0.3, 0.3));
        assert!(Metric::Similarity.improves(0.9, 0.8));
        assert!(!Metric::Similarity.improves(0.8, 0.8));
    }
}
