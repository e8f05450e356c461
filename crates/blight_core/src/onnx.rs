//! ONNX Runtime backed feature extractor.

use crate::config::ModelConfig;
use crate::leaf::LeafImage;
use crate::model::{FeatureExtractor, Features, ScoredLabel};
use anyhow::{Context, Result, anyhow};
use image::{RgbaImage, imageops::FilterType};
use ndarray::{Array4, CowArray};
use once_cell::sync::OnceCell;
use ort::{
    GraphOptimizationLevel, SessionBuilder, environment::Environment, session::Session,
    tensor::OrtOwnedTensor, value::Value,
};
use std::fs;
use std::sync::Arc;

static ORT_ENV: OnceCell<Arc<Environment>> = OnceCell::new();

fn environment() -> Result<Arc<Environment>> {
    ORT_ENV
        .get_or_try_init(|| {
            let env = Environment::builder()
                .with_name("blight-triage")
                .build()?;
            Ok::<_, anyhow::Error>(env.into_arc())
        })
        .cloned()
}

/// Image classifier whose softmaxed labels serve as features.
pub struct OnnxExtractor {
    session: Session,
    labels: Vec<String>,
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    top_k: usize,
}

impl OnnxExtractor {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        if !cfg.model_path.exists() {
            anyhow::bail!("model file missing: {}", cfg.model_path.display());
        }
        if !cfg.labels_path.exists() {
            anyhow::bail!("labels file missing: {}", cfg.labels_path.display());
        }
        let env = environment()?;
        let session = SessionBuilder::new(&env)?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
            .with_model_from_file(&cfg.model_path)?;

        let labels_raw = fs::read_to_string(&cfg.labels_path).context("cannot read labels")?;
        let labels = parse_labels(&labels_raw);
        if labels.is_empty() {
            anyhow::bail!("labels file contains no labels");
        }
        tracing::info!(
            model = %cfg.model_path.display(),
            labels = labels.len(),
            "onnx extractor ready"
        );

        Ok(Self {
            session,
            labels,
            input_size: cfg.input_size,
            mean: cfg.mean,
            std: cfg.std,
            top_k: cfg.top_k.max(1),
        })
    }

    fn prepare_input(&self, image: &LeafImage) -> Array4<f32> {
        let resized = resize_to_square(image.pixels(), self.input_size);
        let side = self.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b, _] = pixel.0;
            let (row, col) = (y as usize, x as usize);
            array[[0, 0, row, col]] = normalize_channel(r, self.mean[0], self.std[0]);
            array[[0, 1, row, col]] = normalize_channel(g, self.mean[1], self.std[1]);
            array[[0, 2, row, col]] = normalize_channel(b, self.mean[2], self.std[2]);
        }
        array
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn extract(&self, image: &LeafImage) -> Result<Features> {
        let input_array = self.prepare_input(image).into_dyn();
        let cow = CowArray::from(input_array.view());
        let input = Value::from_array(self.session.allocator(), &cow)
            .map_err(|e| anyhow!("cannot build input tensor: {e}"))?;
        let outputs: Vec<Value> = self.session.run(vec![input])?;
        let first = outputs.first().ok_or_else(|| anyhow!("model produced no output"))?;
        let logits: OrtOwnedTensor<f32, _> = first.try_extract()?;
        let scores: Vec<f32> = logits.view().iter().cloned().collect();
        if scores.is_empty() {
            anyhow::bail!("empty logits");
        }
        Ok(top_labels(&self.labels, &softmax(&scores), self.top_k))
    }
}

fn parse_labels(raw: &str) -> Vec<String> {
    let mut labels: Vec<String> = raw
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();
    labels.dedup();
    labels
}

fn top_labels(labels: &[String], probs: &[f32], k: usize) -> Features {
    let mut ranked: Vec<(usize, f32)> = probs.iter().cloned().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    Features {
        labels: ranked
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredLabel {
                label: labels
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{idx}")),
                score,
            })
            .collect(),
    }
}

fn resize_to_square(img: &RgbaImage, size: u32) -> RgbaImage {
    image::imageops::resize(img, size, size, FilterType::Triangle)
}

fn normalize_channel(value: u8, mean: f32, std: f32) -> f32 {
    let v = value as f32 / 255.0;
    (v - mean) / std
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|x| x / sum).collect()
}
