//! Disease categories, their static guidance records and predictions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three leaf conditions the classifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    EarlyBlight,
    LateBlight,
    Healthy,
}

impl Category {
    /// All categories in their canonical order.
    pub const ALL: [Category; 3] = [Category::EarlyBlight, Category::LateBlight, Category::Healthy];

    /// Stable label used in storage and labels files.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::EarlyBlight => "early_blight",
            Category::LateBlight => "late_blight",
            Category::Healthy => "healthy",
        }
    }

    pub fn record(self) -> &'static DiseaseRecord {
        match self {
            Category::EarlyBlight => &DISEASES[0],
            Category::LateBlight => &DISEASES[1],
            Category::Healthy => &DISEASES[2],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the storage label, case-insensitively, with spaces or dashes
    /// in place of underscores ("Early Blight", "late-blight"). Repeated
    /// separators and a leading crop name are ignored, so the usual model
    /// label "Potato___Early_blight" parses too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        let mut words: Vec<&str> = lowered.split('_').filter(|w| !w.is_empty()).collect();
        if words.len() > 1 && words[0] == "potato" {
            words.remove(0);
        }
        let normalized = words.join("_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Static guidance shown next to a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseRecord {
    pub id: u32,
    pub name: &'static str,
    pub description: &'static str,
    pub treatment: &'static str,
}

static DISEASES: [DiseaseRecord; 3] = [
    DiseaseRecord {
        id: 1,
        name: "Early Blight",
        description: "A fungal disease caused by Alternaria solani. It appears as dark brown spots with concentric rings on lower leaves first.",
        treatment: "Fungicides with chlorothalonil or copper. Remove infected leaves. Ensure proper plant spacing and avoid overhead watering.",
    },
    DiseaseRecord {
        id: 2,
        name: "Late Blight",
        description: "A severe disease caused by Phytophthora infestans. It creates water-soaked spots that turn brown or black with white mildew underneath.",
        treatment: "Immediate application of fungicides containing chlorothalonil, mancozeb, or copper. Remove infected plants to prevent spread.",
    },
    DiseaseRecord {
        id: 3,
        name: "Healthy",
        description: "No disease detected. The plant appears healthy.",
        treatment: "Continue regular care and monitoring.",
    },
];

/// Look up a disease record by its numeric id.
pub fn disease_by_id(id: u32) -> Option<(Category, &'static DiseaseRecord)> {
    Category::ALL
        .into_iter()
        .map(|c| (c, c.record()))
        .find(|(_, r)| r.id == id)
}

/// Which step of the fallback chain produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Model,
    Similarity,
    PixelHeuristic,
    Mock,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Model => "model",
            Stage::Similarity => "keyword similarity",
            Stage::PixelHeuristic => "pixel heuristic",
            Stage::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// Outcome of a single classification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub category: Category,
    /// Self-reported certainty as an integer percentage.
    pub confidence: u8,
    pub stage: Stage,
}

impl Prediction {
    pub fn record(&self) -> &'static DiseaseRecord {
        self.category.record()
    }
}

/// Convert a ratio in [0,1] to a percentage clamped into `[lo, hi]`.
pub(crate) fn clamp_percent(ratio: f32, lo: u8, hi: u8) -> u8 {
    let pct = (ratio * 100.0).round();
    if pct.is_nan() {
        return lo;
    }
    pct.clamp(lo as f32, hi as f32) as u8
}
