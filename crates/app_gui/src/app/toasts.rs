//! Short-lived notification list shown at the bottom of the window.

use blight_core::{Notification, Severity};
use eframe::egui;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

const TOAST_TTL: Duration = Duration::from_secs(5);
const MAX_TOASTS: usize = 4;

struct Toast {
    severity: Severity,
    message: String,
    shown_at: Instant,
}

pub(super) struct Toasts {
    rx: Receiver<Notification>,
    active: Vec<Toast>,
}

impl Toasts {
    pub(super) fn new(rx: Receiver<Notification>) -> Self {
        Self {
            rx,
            active: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.push_at(severity, message.into(), Instant::now());
    }

    fn push_at(&mut self, severity: Severity, message: String, now: Instant) {
        self.active.push(Toast {
            severity,
            message,
            shown_at: now,
        });
        if self.active.len() > MAX_TOASTS {
            let excess = self.active.len() - MAX_TOASTS;
            self.active.drain(..excess);
        }
    }

    /// Pull queued notifications and drop expired ones.
    pub(super) fn drain(&mut self) {
        let now = Instant::now();
        while let Ok(n) = self.rx.try_recv() {
            self.push_at(n.severity, n.message, now);
        }
        self.expire(now);
    }

    fn expire(&mut self, now: Instant) {
        self.active
            .retain(|t| now.saturating_duration_since(t.shown_at) < TOAST_TTL);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub(super) fn show(&self, ui: &mut egui::Ui) {
        if self.active.is_empty() {
            ui.weak("Ready");
            return;
        }
        for toast in &self.active {
            let color = match toast.severity {
                Severity::Info => egui::Color32::LIGHT_BLUE,
                Severity::Success => egui::Color32::from_rgb(96, 186, 96),
                Severity::Error => egui::Color32::from_rgb(230, 90, 80),
            };
            ui.colored_label(color, &toast.message);
        }
    }
}
