//! Nearest-match search over a reference set snapshot.

use crate::types::{Embedding, Metric};

/// One registered identity and its live embedding.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// Read-only snapshot of all registered embeddings, in registration order.
///
/// Rebuilt fresh from storage for every attendance attempt so recognition
/// always reflects the latest registrations.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, identity: impl Into<String>, embedding: Embedding) {
        self.entries.push(ReferenceEntry {
            identity: identity.into(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter()
    }
}

/// Best match for a probe embedding.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub identity: String,
    pub score: f32,
}

/// Compare `probe` against every reference embedding and return the best
/// entry satisfying the cutoff, or `None`.
///
/// All entries are scored; among those accepted by the metric the best
/// score wins. Ties break toward the earliest-registered entry (strictly
/// better replaces), so results are deterministic for a fixed snapshot.
pub fn find_best_match(
    probe: &Embedding,
    reference: &ReferenceSet,
    metric: Metric,
    cutoff: f32,
) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;

    for entry in reference.iter() {
        let score = metric.score(probe, &entry.embedding);
        if !metric.accepts(score, cutoff) {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => metric.improves(score, current.score),
        };
        if better {
            best = Some(MatchResult {
                identity: entry.identity.clone(),
                score,
            });
        }
    }

    best
}
