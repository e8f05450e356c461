//! Dataset panel: statistics, per-category galleries, upload and export.

use super::{UiApp, UploadQueue};
use blight_core::{Category, DatasetImage, ScanOptions, Severity, export_manifest_csv};
use chrono::Local;
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use rfd::FileDialog;
use std::collections::VecDeque;
use std::fs;

const ROW_HEIGHT: f32 = 72.0;

pub(crate) fn category_title(category: Category) -> &'static str {
    category.record().name
}

impl UiApp {
    pub(super) fn render_dataset_panel(&mut self, ui: &mut egui::Ui) {
        self.render_stats(ui);
        ui.separator();

        ui.horizontal(|ui| {
            for c in Category::ALL {
                let label = format!("{} ({})", category_title(c), self.store.images(c).len());
                ui.selectable_value(&mut self.category, c, label);
            }
        });
        ui.add_space(6.0);

        let uploading = self.uploads.is_some();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!uploading, egui::Button::new("Upload images..."))
                .clicked()
                && let Some(files) = FileDialog::new()
                    .add_filter("Images", &["jpg", "jpeg", "png"])
                    .pick_files()
            {
                self.queue_uploads(files);
            }
            if ui
                .add_enabled(!uploading, egui::Button::new("Import folder..."))
                .clicked()
                && let Some(dir) = FileDialog::new().pick_folder()
            {
                self.import_folder(dir);
            }
            let has_images = self.store.stats().total > 0;
            if ui
                .add_enabled(has_images, egui::Button::new("Export CSV"))
                .clicked()
                && let Some(path) = FileDialog::new()
                    .add_filter("CSV", &["csv"])
                    .set_file_name("potato_dataset.csv")
                    .save_file()
            {
                match export_manifest_csv(self.store.list(), &path) {
                    Ok(()) => self.notify(
                        Severity::Success,
                        format!("CSV exported: {}", path.display()),
                    ),
                    Err(e) => self.notify(Severity::Error, format!("Export failed: {e:#}")),
                }
            }
        });

        if let Some(q) = &self.uploads {
            let done = q.total - q.files.len();
            ui.add(
                egui::ProgressBar::new(done as f32 / q.total.max(1) as f32)
                    .text(format!("Uploading {done}/{}", q.total)),
            );
        }
        ui.add_space(6.0);

        self.render_gallery(ui);
    }

    fn render_stats(&self, ui: &mut egui::Ui) {
        let stats = self.store.stats();
        ui.horizontal(|ui| {
            ui.strong("Total images");
            ui.label(stats.total.to_string());
        });
        for c in Category::ALL {
            ui.horizontal(|ui| {
                ui.label(format!("{}: {}", category_title(c), stats.count(c)));
                ui.add(
                    egui::ProgressBar::new(stats.share(c))
                        .desired_width(240.0)
                        .show_percentage(),
                );
            });
        }
    }

    fn render_gallery(&mut self, ui: &mut egui::Ui) {
        let category = self.category;
        let rows: Vec<DatasetImage> = self.store.images(category).to_vec();
        if rows.is_empty() {
            ui.weak(format!(
                "No {} images yet. Upload some to start building the dataset.",
                category_title(category).to_lowercase()
            ));
            return;
        }

        let mut to_delete: Option<String> = None;
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::exact(ROW_HEIGHT + 8.0))
            .column(Column::remainder())
            .column(Column::auto())
            .column(Column::auto())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Preview");
                });
                header.col(|ui| {
                    ui.strong("File");
                });
                header.col(|ui| {
                    ui.strong("Added");
                });
                header.col(|_| {});
            })
            .body(|mut body| {
                for img in &rows {
                    body.row(ROW_HEIGHT, |mut row| {
                        row.col(|ui| {
                            if let Some(id) = self.get_or_load_thumb(ui.ctx(), img) {
                                ui.image(egui::load::SizedTexture::new(
                                    id,
                                    [ROW_HEIGHT, ROW_HEIGHT],
                                ));
                            }
                        });
                        row.col(|ui| {
                            ui.label(&img.filename);
                        });
                        row.col(|ui| {
                            ui.label(
                                img.date_added
                                    .with_timezone(&Local)
                                    .format("%Y-%m-%d %H:%M")
                                    .to_string(),
                            );
                        });
                        row.col(|ui| {
                            if ui.button("Delete").clicked() {
                                to_delete = Some(img.id.clone());
                            }
                        });
                    });
                }
            });

        if let Some(id) = to_delete {
            match self.store.remove(&id, category) {
                Ok(_) => {
                    self.forget_thumb(&id);
                    self.notify(Severity::Success, "Image deleted successfully");
                }
                Err(e) => {
                    tracing::warn!("delete failed: {e}");
                    self.notify(Severity::Error, "Failed to delete image");
                }
            }
        }
    }

    fn queue_uploads(&mut self, files: Vec<std::path::PathBuf>) {
        if files.is_empty() {
            return;
        }
        self.uploads = Some(UploadQueue {
            category: self.category,
            total: files.len(),
            files: VecDeque::from(files),
            failed: 0,
        });
    }

    /// Add the next queued file. Called once per frame so the progress bar
    /// advances between files.
    pub(super) fn step_uploads(&mut self) {
        let Some(q) = self.uploads.as_mut() else {
            return;
        };
        if let Some(path) = q.files.pop_front() {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let category = q.category;
            let outcome = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    self.store
                        .add(&bytes, &filename, category)
                        .map_err(|e| e.to_string())
                });
            if let Err(e) = outcome {
                tracing::warn!("upload of {} failed: {e}", path.display());
                if let Some(q) = self.uploads.as_mut() {
                    q.failed += 1;
                }
            }
            return;
        }

        let q = match self.uploads.take() {
            Some(q) => q,
            None => return,
        };
        if q.failed == 0 {
            self.notify(
                Severity::Success,
                format!(
                    "Successfully uploaded {} images to {}",
                    q.total,
                    category_title(q.category)
                ),
            );
        } else {
            self.notify(
                Severity::Error,
                format!("Failed to upload {} of {} images", q.failed, q.total),
            );
        }
    }

    fn import_folder(&mut self, dir: std::path::PathBuf) {
        let category = self.category;
        match self
            .store
            .import_folder(&dir, category, ScanOptions { recursive: true })
        {
            Ok(summary) if summary.skipped.is_empty() => self.notify(
                Severity::Success,
                format!(
                    "Imported {} images into {}",
                    summary.added.len(),
                    category_title(category)
                ),
            ),
            Ok(summary) => self.notify(
                Severity::Error,
                format!(
                    "Imported {} images, skipped {}",
                    summary.added.len(),
                    summary.skipped.len()
                ),
            ),
            Err(e) => self.notify(Severity::Error, format!("Import failed: {e}")),
        }
    }
}
