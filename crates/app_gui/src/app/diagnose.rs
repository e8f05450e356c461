//! Diagnose panel: pick a leaf photo, analyze it, show guidance.

use super::{SelectedImage, UiApp, texture_from};
use blight_core::{Category, Prediction, Severity};
use eframe::egui;
use rfd::FileDialog;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

const PREVIEW_SIDE: f32 = 320.0;
const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
const NOT_AN_IMAGE: &str = "Please select an image file";
const TOO_LARGE: &str = "Image size should be less than 5MB";

impl UiApp {
    pub(super) fn render_diagnose_panel(&mut self, ui: &mut egui::Ui) {
        ui.label(
            "Upload a photo of a potato leaf to check it for early or late blight \
             and get treatment recommendations.",
        );
        ui.add_space(8.0);

        let busy = self.pending.is_some();
        if !busy {
            let dropped = ui.ctx().input(|i| i.raw.dropped_files.clone());
            if let Some(file) = dropped.into_iter().next() {
                match (file.bytes, file.path) {
                    (Some(bytes), path) => {
                        let path = path.unwrap_or_else(|| PathBuf::from(&file.name));
                        self.select_bytes(ui.ctx(), path, bytes.to_vec());
                    }
                    (None, Some(path)) => self.select_image(ui.ctx(), path),
                    (None, None) => self.notify(Severity::Error, NOT_AN_IMAGE),
                }
            }
        }
        let hovering = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!busy, egui::Button::new("Choose image..."))
                .clicked()
                && let Some(path) = FileDialog::new()
                    .add_filter("Images", &["jpg", "jpeg", "png"])
                    .pick_file()
            {
                self.select_image(ui.ctx(), path);
            }

            let can_analyze = self.selected.is_some() && !busy;
            if ui
                .add_enabled(can_analyze, egui::Button::new("Analyze"))
                .clicked()
            {
                self.start_prediction(ui.ctx());
            }

            if ui
                .add_enabled(self.selected.is_some() && !busy, egui::Button::new("Reset"))
                .clicked()
            {
                self.selected = None;
                self.prediction = None;
            }
        });
        ui.add_space(8.0);

        ui.columns(2, |cols| {
            match &self.selected {
                Some(sel) => {
                    cols[0].label(sel.path.display().to_string());
                    if let Some(tex) = &sel.texture {
                        let size = fit(tex.size_vec2(), PREVIEW_SIDE);
                        cols[0].image(egui::load::SizedTexture::new(tex.id(), size));
                    }
                }
                None if hovering => {
                    cols[0].strong("Drop the image to select it");
                }
                None => {
                    cols[0].weak("No image selected, or drop one here");
                }
            }

            if busy {
                cols[1].horizontal(|ui| {
                    ui.spinner();
                    ui.label("Analyzing leaf...");
                });
            } else if let Some(p) = &self.prediction {
                render_prediction(&mut cols[1], p);
            }
        });
    }

    fn select_image(&mut self, ctx: &egui::Context, path: PathBuf) {
        // Refuse oversized files before reading them in.
        if let Ok(meta) = fs::metadata(&path)
            && meta.len() > MAX_UPLOAD_BYTES
        {
            self.notify(Severity::Error, TOO_LARGE);
            return;
        }
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.notify(Severity::Error, format!("Could not read {}: {e}", path.display()));
                return;
            }
        };
        self.select_bytes(ctx, path, bytes);
    }

    fn select_bytes(&mut self, ctx: &egui::Context, path: PathBuf, bytes: Vec<u8>) {
        if let Err(reason) = check_upload(&bytes) {
            tracing::info!("rejected {}: {reason}", path.display());
            self.notify(Severity::Error, reason);
            return;
        }
        let texture = match image::load_from_memory(&bytes) {
            Ok(img) => Some(texture_from(ctx, "diagnose:preview", &img)),
            Err(e) => {
                tracing::warn!("preview decode failed for {}: {e}", path.display());
                None
            }
        };
        self.prediction = None;
        self.selected = Some(SelectedImage {
            path,
            bytes: Arc::new(bytes),
            texture,
        });
    }

    fn start_prediction(&mut self, ctx: &egui::Context) {
        let Some(sel) = &self.selected else {
            self.notify(Severity::Error, "Please select an image first");
            return;
        };
        let (tx, rx) = mpsc::channel();
        let classifier = self.classifier.clone();
        let bytes = sel.bytes.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let result = classifier.classify(&bytes).map_err(|e| e.to_string());
            let _ = tx.send(result);
            ctx.request_repaint();
        });
        self.pending = Some(rx);
    }

    pub(super) fn poll_prediction(&mut self) {
        let Some(rx) = &self.pending else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(p)) => {
                self.prediction = Some(p);
                self.pending = None;
            }
            Ok(Err(e)) => {
                self.pending = None;
                tracing::warn!("prediction failed: {e}");
                self.notify(Severity::Error, "Failed to analyze image. Please try again.");
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {
                self.pending = None;
                self.notify(Severity::Error, "Analysis stopped unexpectedly");
            }
        }
    }
}

fn render_prediction(ui: &mut egui::Ui, p: &Prediction) {
    let record = p.record();
    let color = match p.category {
        Category::Healthy => egui::Color32::from_rgb(96, 186, 96),
        Category::EarlyBlight => egui::Color32::from_rgb(214, 160, 60),
        Category::LateBlight => egui::Color32::from_rgb(220, 80, 70),
    };
    ui.label(egui::RichText::new(record.name).size(22.0).strong().color(color));
    ui.add(
        egui::ProgressBar::new(p.confidence as f32 / 100.0)
            .text(format!("Confidence {}%", p.confidence)),
    );
    ui.weak(format!("Decided by {}", p.stage));
    ui.add_space(8.0);
    ui.strong("Description");
    ui.label(record.description);
    ui.add_space(6.0);
    ui.strong("Treatment");
    ui.label(record.treatment);
}

/// Gate for files offered to the Diagnose panel.
fn check_upload(bytes: &[u8]) -> Result<(), &'static str> {
    if image::guess_format(bytes).is_err() {
        Err(NOT_AN_IMAGE)
    } else if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        Err(TOO_LARGE)
    } else {
        Ok(())
    }
}

/// Scale `size` to fit in a `side` x `side` box, keeping aspect ratio.
fn fit(size: egui::Vec2, side: f32) -> egui::Vec2 {
    if size.x <= 0.0 || size.y <= 0.0 {
        return egui::Vec2::splat(side);
    }
    let scale = (side / size.x).min(side / size.y).min(1.0);
    size * scale
}
