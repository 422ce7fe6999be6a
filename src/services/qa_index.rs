//! Per-session similarity index over prior question/answer turns.
//!
//! The index is disposable: it holds the turns themselves and is rebuilt from
//! them whenever a session is reloaded from storage.

use std::cmp::Ordering;

use crate::models::QaTurn;

/// A turn matched by `QaIndex::search`
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub turn: &'a QaTurn,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct QaIndex {
    /// Sorted by turn_id
    turns: Vec<QaTurn>,
}

impl QaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: impl IntoIterator<Item = QaTurn>) -> Self {
        let mut index = Self::new();
        for turn in turns {
            index.insert(turn);
        }
        index
    }

    /// Add a turn. Inserting an already indexed turn_id is a no-op and returns false.
    pub fn insert(&mut self, turn: QaTurn) -> bool {
        match self
            .turns
            .binary_search_by_key(&turn.turn_id, |existing| existing.turn_id)
        {
            Ok(_) => false,
            Err(position) => {
                self.turns.insert(position, turn);
                true
            }
        }
    }

    pub fn turns(&self) -> &[QaTurn] {
        &self.turns
    }

    pub fn get(&self, turn_id: i64) -> Option<&QaTurn> {
        self.turns
            .binary_search_by_key(&turn_id, |turn| turn.turn_id)
            .ok()
            .map(|position| &self.turns[position])
    }

    pub fn last_turn_id(&self) -> Option<i64> {
        self.turns.last().map(|turn| turn.turn_id)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Up to `k` turns ranked by cosine similarity to `query`.
    ///
    /// Turns scoring below `min_relevance` (or not above zero) are dropped.
    /// Equal scores rank the more recent turn first.
    pub fn search(&self, query: &[f32], k: usize, min_relevance: f32) -> Vec<SearchHit<'_>> {
        if k == 0 || self.turns.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_>> = self
            .turns
            .iter()
            .map(|turn| SearchHit {
                turn,
                score: cosine_similarity(query, turn.embedding()),
            })
            .filter(|hit| hit.score > 0.0 && hit.score >= min_relevance)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.turn.turn_id.cmp(&a.turn.turn_id))
        });
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero-norm vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
