use blight_core::{
    AppConfig, Category, ChannelNotifier, Classifier, ClassifierSettings, DatasetStore,
    FeatureExtractor, Features, LeafImage, ModelHandle, Notification, ScanOptions, ScoredLabel,
    Severity, Stage, TracingNotifier, export_manifest_csv,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::fs;
use std::sync::{Arc, mpsc};
use tempfile::tempdir;

fn png(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(20, 20, Rgba([rgb[0], rgb[1], rgb[2], 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

struct SymptomExtractor;

impl FeatureExtractor for SymptomExtractor {
    fn extract(&self, image: &LeafImage) -> anyhow::Result<Features> {
        let [r, g, _, _] = image.pixels().get_pixel(0, 0).0;
        let label = if r > g {
            "phytophthora lesion, water-soaked, black rot"
        } else {
            "tabby cat"
        };
        Ok(Features {
            labels: vec![ScoredLabel {
                label: label.to_string(),
                score: 0.8,
            }],
        })
    }
}

#[test]
fn import_classify_export_and_prune() -> anyhow::Result<()> {
    let work = tempdir()?;
    let incoming = work.path().join("incoming");
    fs::create_dir(&incoming)?;
    fs::write(incoming.join("green.png"), png([0, 255, 0]))?;
    fs::write(incoming.join("rusty.png"), png([139, 69, 19]))?;
    fs::write(incoming.join("README.txt"), "not an image")?;
    fs::write(incoming.join("broken.jpg"), "not a jpeg either")?;

    let cfg = AppConfig {
        data_dir: work.path().join("data"),
        ..AppConfig::default()
    };
    let mut store = DatasetStore::open_dir(&cfg.data_dir, cfg.storage_key.clone());
    let summary = store.import_folder(&incoming, Category::EarlyBlight, ScanOptions::default())?;
    assert_eq!(summary.added.len(), 2);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].0.ends_with("broken.jpg"));

    let classifier = Classifier::from_settings(&ClassifierSettings::default(), Arc::new(TracingNotifier));
    let mut labels = Vec::new();
    for img in store.images(Category::EarlyBlight) {
        let p = classifier.classify(&store.image_bytes(img)?)?;
        assert_eq!(p.stage, Stage::PixelHeuristic);
        assert!((70..=98).contains(&p.confidence));
        labels.push((img.filename.clone(), p.category));
    }
    assert_eq!(
        labels,
        vec![
            ("green.png".to_string(), Category::Healthy),
            ("rusty.png".to_string(), Category::EarlyBlight),
        ]
    );

    let manifest = work.path().join("manifest.csv");
    export_manifest_csv(store.list(), &manifest)?;
    assert_eq!(fs::read_to_string(&manifest)?.lines().count(), 3);

    let first = store.images(Category::EarlyBlight)[0].clone();
    store.remove(&first.id, Category::EarlyBlight)?;
    assert!(store.image_bytes(&first).is_err());

    let reopened = DatasetStore::open_dir(&cfg.data_dir, cfg.storage_key);
    assert_eq!(reopened.stats().early_blight, 1);
    assert_eq!(reopened.stats().total, 1);
    Ok(())
}

#[test]
fn custom_extractor_drives_similarity_stage() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<Notification>();
    let model = ModelHandle::new(|| Ok(Arc::new(SymptomExtractor) as Arc<dyn FeatureExtractor>));
    let classifier = Classifier::new(
        model,
        Default::default(),
        Arc::new(ChannelNotifier::new(tx)),
    );

    let p = classifier.classify(&png([139, 69, 19]))?;
    assert_eq!(p.category, Category::LateBlight);
    assert_eq!(p.stage, Stage::Similarity);

    // No keyword hits: the pixel heuristic decides.
    let p = classifier.classify(&png([0, 255, 0]))?;
    assert_eq!(p.category, Category::Healthy);
    assert_eq!(p.stage, Stage::PixelHeuristic);

    let severities: Vec<Severity> = rx.try_iter().map(|n| n.severity).collect();
    assert_eq!(severities, vec![Severity::Info, Severity::Success]);
    Ok(())
}
