//! Keyword matching over the model's label output.

use crate::disease::{Category, Prediction, Stage, clamp_percent};
use crate::model::Features;
use serde::{Deserialize, Serialize};

/// Raw score awarded per matched keyword.
pub const KEYWORD_INCREMENT: f32 = 0.15;
/// Matches needed before a category is trusted (0.6 raw score).
pub const MIN_MATCHES: usize = 4;

/// Keywords associated with each category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTable {
    pub early_blight: Vec<String>,
    pub late_blight: Vec<String>,
    pub healthy: Vec<String>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            early_blight: owned(&[
                "early blight",
                "alternaria",
                "concentric",
                "target spot",
                "brown spot",
                "leaf spot",
                "lesion",
                "yellow",
            ]),
            late_blight: owned(&[
                "late blight",
                "phytophthora",
                "water-soaked",
                "mildew",
                "mold",
                "rot",
                "black",
                "necrosis",
            ]),
            healthy: owned(&[
                "healthy",
                "green",
                "leaf",
                "foliage",
                "plant",
                "fresh",
                "vegetation",
                "potato",
            ]),
        }
    }
}

impl KeywordTable {
    pub fn keywords(&self, category: Category) -> &[String] {
        match category {
            Category::EarlyBlight => &self.early_blight,
            Category::LateBlight => &self.late_blight,
            Category::Healthy => &self.healthy,
        }
    }

    /// Count, per category, how many keywords appear in `text`.
    pub fn matches(&self, text: &str) -> [(Category, usize); 3] {
        let text = text.to_lowercase();
        Category::ALL.map(|c| {
            let n = self
                .keywords(c)
                .iter()
                .filter(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
                .count();
            (c, n)
        })
    }
}

/// Best category found by keyword matching and whether it cleared the bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityOutcome {
    pub category: Category,
    pub score: f32,
    pub accepted: bool,
}

pub fn score(table: &KeywordTable, features: &Features) -> SimilarityOutcome {
    let text = features.text();
    let mut best: Option<(Category, usize)> = None;
    for (category, n) in table.matches(&text) {
        if best.is_none_or(|(_, b)| n > b) {
            best = Some((category, n));
        }
    }
    match best {
        Some((category, n)) if n >= MIN_MATCHES => SimilarityOutcome {
            category,
            score: n as f32 * KEYWORD_INCREMENT,
            accepted: true,
        },
        Some((_, n)) => SimilarityOutcome {
            category: Category::Healthy,
            score: n as f32 * KEYWORD_INCREMENT,
            accepted: false,
        },
        None => SimilarityOutcome {
            category: Category::Healthy,
            score: 0.0,
            accepted: false,
        },
    }
}

/// Run the similarity stage; `None` hands over to the pixel heuristic.
pub fn classify(table: &KeywordTable, features: &Features) -> Option<Prediction> {
    let outcome = score(table, features);
    tracing::debug!(
        category = %outcome.category,
        score = outcome.score,
        accepted = outcome.accepted,
        "keyword similarity"
    );
    outcome.accepted.then(|| Prediction {
        category: outcome.category,
        confidence: clamp_percent(outcome.score, 70, 95),
        stage: Stage::Similarity,
    })
}
