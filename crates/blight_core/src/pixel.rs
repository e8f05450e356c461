//! Color-ratio heuristic, the last stage of the fallback chain.

use crate::disease::{Category, Prediction, Stage, clamp_percent};
use crate::leaf::LeafImage;
use rayon::prelude::*;

/// Green share above which a leaf counts as healthy.
pub const HEALTHY_GREEN_RATIO: f32 = 0.6;

const BLACK_MAX: u8 = 50;
const BROWN_MIN_RED: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelClass {
    Black,
    Green,
    Brown,
    Other,
}

fn classify_pixel(r: u8, g: u8, b: u8) -> PixelClass {
    if r < BLACK_MAX && g < BLACK_MAX && b < BLACK_MAX {
        PixelClass::Black
    } else if g > r && g > b {
        PixelClass::Green
    } else if r > g && g > b && r > BROWN_MIN_RED {
        PixelClass::Brown
    } else {
        PixelClass::Other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelRatios {
    pub green: f32,
    pub brown: f32,
    pub black: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    green: u64,
    brown: u64,
    black: u64,
    total: u64,
}

impl Counts {
    fn add(mut self, class: PixelClass) -> Self {
        match class {
            PixelClass::Green => self.green += 1,
            PixelClass::Brown => self.brown += 1,
            PixelClass::Black => self.black += 1,
            PixelClass::Other => {}
        }
        self.total += 1;
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            green: self.green + other.green,
            brown: self.brown + other.brown,
            black: self.black + other.black,
            total: self.total + other.total,
        }
    }
}

/// Share of green-ish, brown-ish and near-black pixels over all pixels.
pub fn ratios(image: &LeafImage) -> PixelRatios {
    let counts = image
        .pixels()
        .as_raw()
        .par_chunks_exact(4)
        .fold(Counts::default, |acc, px| {
            acc.add(classify_pixel(px[0], px[1], px[2]))
        })
        .reduce(Counts::default, Counts::merge);

    if counts.total == 0 {
        return PixelRatios::default();
    }
    let total = counts.total as f32;
    PixelRatios {
        green: counts.green as f32 / total,
        brown: counts.brown as f32 / total,
        black: counts.black as f32 / total,
    }
}

/// Decide a category from pixel ratios.
pub fn decide(r: PixelRatios) -> Prediction {
    let (category, confidence) = if r.green > HEALTHY_GREEN_RATIO {
        (Category::Healthy, clamp_percent(r.green, 70, 90))
    } else if r.brown > r.black {
        (Category::EarlyBlight, clamp_percent(r.brown, 70, 85))
    } else {
        (Category::LateBlight, clamp_percent(r.black, 70, 85))
    };
    Prediction {
        category,
        confidence,
        stage: Stage::PixelHeuristic,
    }
}

pub fn classify(image: &LeafImage) -> Prediction {
    let r = ratios(image);
    let prediction = decide(r);
    tracing::debug!(
        green = r.green,
        brown = r.brown,
        black = r.black,
        category = %prediction.category,
        "pixel heuristic decision"
    );
    prediction
}
