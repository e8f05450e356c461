use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod blob;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod disease;
pub mod error;
pub mod leaf;
pub mod model;
pub mod notify;
#[cfg(feature = "ort")]
pub mod onnx;
pub mod pixel;
pub mod similarity;
pub mod storage;

pub use classifier::Classifier;
pub use config::{AppConfig, ClassifierMode, ClassifierSettings, ModelConfig};
pub use dataset::{DatasetImage, DatasetSnapshot, DatasetStats, DatasetStore, ImportSummary};
pub use disease::{Category, DiseaseRecord, Prediction, Stage, disease_by_id};
pub use error::{ClassifyError, ConfigError, DatasetError, PersistenceError};
pub use leaf::LeafImage;
pub use model::{FeatureExtractor, Features, ModelHandle, ModelStatus, ScoredLabel};
pub use notify::{ChannelNotifier, Notification, Notifier, Severity, TracingNotifier};

/// Options controlling how folder scanning behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// When true, scan subdirectories recursively.
    pub recursive: bool,
}

/// List the supported images in a folder.
pub fn scan_folder(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    scan_folder_with(path, ScanOptions::default())
}

/// Scan a folder with options. Results are sorted by path.
pub fn scan_folder_with(path: impl AsRef<Path>, opts: ScanOptions) -> Result<Vec<PathBuf>> {
    let root = path.as_ref();
    if !root.exists() {
        anyhow::bail!("Path does not exist: {}", root.display());
    }
    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }

    let walker = if opts.recursive {
        WalkDir::new(root).sort_by_file_name().into_iter()
    } else {
        WalkDir::new(root).max_depth(1).sort_by_file_name().into_iter()
    };

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("walkdir error: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_supported_image(path) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Export the dataset to CSV with headers:
/// id,filename,category,date_added,url
pub fn export_manifest_csv(data: &DatasetSnapshot, path: impl AsRef<Path>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["id", "filename", "category", "date_added", "url"])?;

    for (category, img) in data.iter() {
        wtr.write_record([
            img.id.as_str(),
            img.filename.as_str(),
            category.as_str(),
            img.date_added.to_rfc3339().as_str(),
            img.url.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg" | "png")
        }
        None => false,
    }
}
