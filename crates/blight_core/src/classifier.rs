//! Three-stage classification with guaranteed fallback.

use crate::config::{ClassifierMode, ClassifierSettings};
use crate::disease::{Category, Prediction, Stage, clamp_percent};
use crate::error::ClassifyError;
use crate::leaf::LeafImage;
use crate::model::{Features, ModelHandle};
use crate::notify::{Notifier, Severity};
use crate::pixel;
use crate::similarity::{self, KeywordTable};
use rand::Rng;
use std::path::Path;
use std::sync::Arc;

/// What the model stage handed on.
enum ModelOutcome {
    Decided(Prediction),
    Features(Features),
}

/// Classifies leaf images into one of the three categories.
///
/// The model stage is tried first, then keyword similarity over the model's
/// labels, then the pixel heuristic. Only input errors escape.
pub struct Classifier {
    model: ModelHandle,
    keywords: KeywordTable,
    mode: ClassifierMode,
    notifier: Arc<dyn Notifier>,
}

impl Classifier {
    pub fn new(model: ModelHandle, keywords: KeywordTable, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            model,
            keywords,
            mode: ClassifierMode::Chain,
            notifier,
        }
    }

    /// Build from settings, wiring the ONNX extractor when one is configured.
    pub fn from_settings(settings: &ClassifierSettings, notifier: Arc<dyn Notifier>) -> Self {
        let model = model_handle(settings);
        let mut classifier = Self::new(model, settings.keywords.clone(), notifier);
        classifier.mode = settings.mode;
        classifier
    }

    pub fn with_mode(mut self, mode: ClassifierMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn classify(&self, bytes: &[u8]) -> Result<Prediction, ClassifyError> {
        let image = LeafImage::acquire(bytes)?;
        Ok(self.classify_image(&image))
    }

    pub fn classify_file(&self, path: impl AsRef<Path>) -> Result<Prediction, ClassifyError> {
        let image = LeafImage::open(path)?;
        Ok(self.classify_image(&image))
    }

    /// Run the chain on an already decoded image. Never fails.
    pub fn classify_image(&self, image: &LeafImage) -> Prediction {
        if self.mode == ClassifierMode::Mock {
            return mock_prediction(&mut rand::rng());
        }

        let prediction = match self.model_stage(image) {
            Some(ModelOutcome::Decided(p)) => p,
            Some(ModelOutcome::Features(features)) => {
                similarity::classify(&self.keywords, &features)
                    .unwrap_or_else(|| pixel::classify(image))
            }
            None => pixel::classify(image),
        };
        tracing::info!(
            category = %prediction.category,
            confidence = prediction.confidence,
            stage = %prediction.stage,
            "classified leaf"
        );
        prediction
    }

    fn model_stage(&self, image: &LeafImage) -> Option<ModelOutcome> {
        let extractor = match self.model.acquire(self.notifier.as_ref()) {
            Ok(extractor) => extractor,
            Err(reason) => {
                tracing::debug!("skipping model stage: {reason}");
                return None;
            }
        };
        let features = match extractor.extract(image) {
            Ok(features) => features,
            Err(err) => {
                tracing::warn!("feature extraction failed: {err:#}");
                self.notifier.notify(
                    Severity::Error,
                    "Model analysis failed, using image heuristics",
                );
                return None;
            }
        };
        let direct = features
            .top()
            .and_then(|top| Some((top.label.parse::<Category>().ok()?, top.score)));
        match direct {
            Some((category, score)) => Some(ModelOutcome::Decided(Prediction {
                category,
                confidence: clamp_percent(score, 70, 98),
                stage: Stage::Model,
            })),
            None => Some(ModelOutcome::Features(features)),
        }
    }
}

#[cfg(feature = "ort")]
fn model_handle(settings: &ClassifierSettings) -> ModelHandle {
    match settings.model.clone() {
        Some(cfg) => ModelHandle::new(move || {
            let extractor = crate::onnx::OnnxExtractor::new(&cfg)?;
            Ok(Arc::new(extractor) as Arc<dyn crate::model::FeatureExtractor>)
        }),
        None => ModelHandle::disabled(),
    }
}

#[cfg(not(feature = "ort"))]
fn model_handle(settings: &ClassifierSettings) -> ModelHandle {
    if settings.model.is_some() {
        tracing::warn!("model configured but built without the `ort` feature; model stage disabled");
    }
    ModelHandle::disabled()
}

/// Uniformly random category with confidence in [70,98].
fn mock_prediction(rng: &mut impl Rng) -> Prediction {
    let category = Category::ALL[rng.random_range(0..Category::ALL.len())];
    Prediction {
        category,
        confidence: rng.random_range(70..=98),
        stage: Stage::Mock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::test_support::{solid_png, split_png};
    use crate::model::FeatureExtractor;
    use crate::model::test_support::{FixedExtractor, fixed};
    use crate::notify::test_support::RecordingNotifier;
    use rstest::rstest;

    fn classifier(model: ModelHandle) -> (Classifier, Arc<RecordingNotifier>) {
        let notes = Arc::new(RecordingNotifier::default());
        let c = Classifier::new(model, KeywordTable::default(), notes.clone());
        (c, notes)
    }

    #[test]
    fn empty_input_is_rejected_before_any_stage() {
        let (c, notes) = classifier(ModelHandle::disabled());
        assert!(matches!(c.classify(&[]), Err(ClassifyError::NoImageProvided)));
        assert_eq!(c.model().status(), crate::model::ModelStatus::Unloaded);
        assert!(notes.severities().is_empty());
    }

    #[rstest]
    #[case([0, 255, 0])]
    #[case([0, 0, 0])]
    #[case([139, 69, 19])]
    #[case([200, 200, 200])]
    fn unavailable_model_matches_pixel_heuristic(#[case] rgb: [u8; 3]) {
        let (c, _) = classifier(ModelHandle::disabled());
        let bytes = solid_png(12, 12, rgb);
        let expected = pixel::classify(&LeafImage::acquire(&bytes).unwrap());
        assert_eq!(c.classify(&bytes).unwrap(), expected);
    }

    #[test]
    fn category_label_from_model_decides_directly() {
        let (c, _) = classifier(ModelHandle::ready(fixed(&[
            ("healthy", 0.2),
            ("late_blight", 0.99),
        ])));
        let p = c.classify(&solid_png(8, 8, [0, 255, 0])).unwrap();
        assert_eq!(p.category, Category::LateBlight);
        assert_eq!(p.confidence, 98);
        assert_eq!(p.stage, Stage::Model);
    }

    #[test]
    fn crop_prefixed_model_labels_decide_directly() {
        let (c, _) = classifier(ModelHandle::ready(fixed(&[
            ("Potato___Early_blight", 0.9),
            ("Potato___healthy", 0.05),
        ])));
        let p = c.classify(&solid_png(8, 8, [0, 255, 0])).unwrap();
        assert_eq!(p.category, Category::EarlyBlight);
        assert_eq!(p.confidence, 90);
        assert_eq!(p.stage, Stage::Model);
    }

    #[test]
    fn descriptive_labels_go_through_similarity() {
        let (c, _) = classifier(ModelHandle::ready(fixed(&[
            ("brown spot with concentric rings", 0.6),
            ("alternaria lesion", 0.3),
        ])));
        let p = c.classify(&solid_png(8, 8, [0, 255, 0])).unwrap();
        assert_eq!(p.category, Category::EarlyBlight);
        assert_eq!(p.stage, Stage::Similarity);
        assert!((70..=95).contains(&p.confidence));
    }

    #[test]
    fn weak_similarity_falls_to_pixels() {
        let (c, _) = classifier(ModelHandle::ready(fixed(&[("tabby cat", 0.9)])));
        let bytes = split_png(10, 10, 8, [0, 200, 0], [0, 0, 0]);
        let p = c.classify(&bytes).unwrap();
        assert_eq!(p.stage, Stage::PixelHeuristic);
        assert_eq!(p.category, Category::Healthy);
        assert_eq!(p.confidence, 80);
    }

    #[test]
    fn extraction_error_notifies_and_falls_back() {
        let broken: Arc<dyn FeatureExtractor> = Arc::new(FixedExtractor { labels: None });
        let (c, notes) = classifier(ModelHandle::ready(broken));
        let p = c.classify(&solid_png(8, 8, [0, 0, 0])).unwrap();
        assert_eq!(p.stage, Stage::PixelHeuristic);
        assert_eq!(p.category, Category::LateBlight);
        assert_eq!(notes.severities(), vec![Severity::Error]);
    }

    #[test]
    fn failing_loader_is_tried_once_across_requests() {
        let (c, notes) = classifier(ModelHandle::new(|| anyhow::bail!("no weights")));
        let bytes = solid_png(8, 8, [0, 255, 0]);
        for _ in 0..3 {
            let p = c.classify(&bytes).unwrap();
            assert_eq!(p.stage, Stage::PixelHeuristic);
        }
        assert_eq!(notes.severities(), vec![Severity::Info, Severity::Error]);
    }

    #[test]
    fn mock_mode_stays_in_range() {
        let (c, _) = classifier(ModelHandle::disabled());
        let c = c.with_mode(ClassifierMode::Mock);
        let bytes = solid_png(4, 4, [0, 0, 0]);
        for _ in 0..200 {
            let p = c.classify(&bytes).unwrap();
            assert_eq!(p.stage, Stage::Mock);
            assert!((70..=98).contains(&p.confidence));
        }
    }

    #[test]
    fn from_settings_without_model_uses_heuristics() {
        let c = Classifier::from_settings(
            &ClassifierSettings::default(),
            Arc::new(RecordingNotifier::default()),
        );
        let p = c.classify(&solid_png(8, 8, [0, 255, 0])).unwrap();
        assert_eq!(p.stage, Stage::PixelHeuristic);
        assert_eq!(p.category, Category::Healthy);
    }
}
