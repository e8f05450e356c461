use anyhow::Context;
use blight_core::AppConfig;
use directories_next::ProjectDirs;
use eframe::{NativeOptions, egui};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;

use app::UiApp;

const CONFIG_ENV: &str = "BLIGHT_CONFIG";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Could not load configuration: {e:#}");
            std::process::exit(2);
        }
    };
    tracing::info!(data_dir = %config.data_dir.display(), "starting");

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([960.0, 720.0]),
        ..NativeOptions::default()
    };
    if let Err(e) = eframe::run_native(
        "Potato Leaf Blight Triage",
        options,
        Box::new(move |cc| {
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Box::new(UiApp::new(cc, &config)))
        }),
    ) {
        eprintln!("Application stopped with error: {e}");
    }
}

/// Config comes from `$BLIGHT_CONFIG`, else the platform config dir. Without
/// a config file, data lives in the platform data dir.
fn load_config() -> anyhow::Result<AppConfig> {
    let dirs = ProjectDirs::from("org", "blight-triage", "BlightTriage");
    let path = match std::env::var_os(CONFIG_ENV) {
        Some(p) => PathBuf::from(p),
        None => dirs
            .as_ref()
            .map(|d| d.config_dir().join("blight.toml"))
            .unwrap_or_else(|| PathBuf::from("blight.toml")),
    };
    let exists = path.exists();
    let mut cfg = AppConfig::load_or_default(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    if !exists && let Some(d) = &dirs {
        cfg.data_dir = d.data_local_dir().to_path_buf();
    }
    Ok(cfg)
}
