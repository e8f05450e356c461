//! Application state and top-level layout.

mod dataset;
mod diagnose;
mod toasts;

use blight_core::{
    AppConfig, Category, ChannelNotifier, Classifier, DatasetImage, DatasetStore, Prediction,
    Severity,
};
use eframe::{App, Frame, egui};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;
use toasts::Toasts;

const THUMB_SIZE: u32 = 96;
const MAX_THUMBS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Panel {
    Diagnose,
    Dataset,
}

/// The image picked on the Diagnose panel.
struct SelectedImage {
    path: PathBuf,
    bytes: Arc<Vec<u8>>,
    texture: Option<egui::TextureHandle>,
}

/// Files waiting to be added to the dataset, one per frame.
struct UploadQueue {
    category: Category,
    files: VecDeque<PathBuf>,
    total: usize,
    failed: usize,
}

pub struct UiApp {
    panel: Panel,
    classifier: Arc<Classifier>,
    store: DatasetStore,
    toasts: Toasts,
    app_version: &'static str,

    selected: Option<SelectedImage>,
    pending: Option<mpsc::Receiver<Result<Prediction, String>>>,
    prediction: Option<Prediction>,

    category: Category,
    uploads: Option<UploadQueue>,
    // Thumbnail cache (basic LRU)
    thumbs: HashMap<String, egui::TextureHandle>,
    thumb_keys: VecDeque<String>,
}

impl UiApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: &AppConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let notifier = Arc::new(ChannelNotifier::new(tx));
        let classifier = Classifier::from_settings(&config.classifier, notifier.clone());
        let store = DatasetStore::open_dir_with_notifier(
            &config.data_dir,
            config.storage_key.clone(),
            notifier,
        );
        Self {
            panel: Panel::Diagnose,
            classifier: Arc::new(classifier),
            store,
            toasts: Toasts::new(rx),
            app_version: env!("BLIGHT_VERSION"),
            selected: None,
            pending: None,
            prediction: None,
            category: Category::EarlyBlight,
            uploads: None,
            thumbs: HashMap::new(),
            thumb_keys: VecDeque::new(),
        }
    }

    fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        self.toasts.push(severity, message);
    }

    fn get_or_load_thumb(
        &mut self,
        ctx: &egui::Context,
        image: &DatasetImage,
    ) -> Option<egui::TextureId> {
        if let Some(tex) = self.thumbs.get(&image.id) {
            return Some(tex.id());
        }

        let decoded = self
            .store
            .image_bytes(image)
            .map_err(|e| e.to_string())
            .and_then(|bytes| image::load_from_memory(&bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(img) => {
                let thumb = img.thumbnail(THUMB_SIZE, THUMB_SIZE);
                let tex = texture_from(ctx, &format!("thumb:{}", image.id), &thumb);
                self.thumbs.insert(image.id.clone(), tex);
                self.thumb_keys.push_back(image.id.clone());
                if self.thumbs.len() > MAX_THUMBS
                    && let Some(old) = self.thumb_keys.pop_front()
                {
                    self.thumbs.remove(&old);
                }
                self.thumbs.get(&image.id).map(|t| t.id())
            }
            Err(e) => {
                tracing::warn!("Failed to load thumbnail for {}: {}", image.filename, e);
                None
            }
        }
    }

    fn forget_thumb(&mut self, id: &str) {
        self.thumbs.remove(id);
        self.thumb_keys.retain(|k| k != id);
    }
}

pub(crate) fn texture_from(
    ctx: &egui::Context,
    name: &str,
    img: &image::DynamicImage,
) -> egui::TextureHandle {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let size = [w as usize, h as usize];
    let pixels = rgba.into_raw();
    let color = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
    ctx.load_texture(name, color, egui::TextureOptions::LINEAR)
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_prediction();
        self.step_uploads();
        self.toasts.drain();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Potato Leaf Blight Triage");
                ui.separator();
                ui.selectable_value(&mut self.panel, Panel::Diagnose, "Diagnose");
                ui.selectable_value(&mut self.panel, Panel::Dataset, "Dataset");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(format!("v{}", self.app_version));
                });
            });
        });

        egui::TopBottomPanel::bottom("toasts").show(ctx, |ui| {
            self.toasts.show(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.panel {
            Panel::Diagnose => self.render_diagnose_panel(ui),
            Panel::Dataset => self.render_dataset_panel(ui),
        });

        if self.pending.is_some() || self.uploads.is_some() || !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
