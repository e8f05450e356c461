//! Optional feature-extraction pipeline and its lazily loaded handle.

use crate::leaf::LeafImage;
use crate::notify::{Notifier, Severity};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A label emitted by the extractor together with its score in [0,1].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

/// Extractor output, ordered by descending score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    pub labels: Vec<ScoredLabel>,
}

impl Features {
    pub fn top(&self) -> Option<&ScoredLabel> {
        self.labels
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    /// Searchable text made of all label names, underscores read as spaces.
    pub fn text(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.label.replace('_', " "))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Something that can turn a decoded leaf into scored labels.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &LeafImage) -> anyhow::Result<Features>;
}

type Loader = dyn Fn() -> anyhow::Result<Arc<dyn FeatureExtractor>> + Send + Sync;

enum State {
    Unloaded,
    Loading,
    Ready(Arc<dyn FeatureExtractor>),
    Failed(String),
}

/// Observable lifecycle of a [`ModelHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelUnavailable {
    #[error("model is still loading")]
    Loading,
    #[error("model unavailable: {0}")]
    Failed(String),
}

struct Inner {
    loader: Option<Box<Loader>>,
    state: Mutex<State>,
}

/// Shared handle to the feature extractor.
///
/// The loader runs at most once per handle. A caller that finds the handle
/// loading does not wait for it. A failed load is final.
#[derive(Clone)]
pub struct ModelHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("status", &self.status())
            .finish()
    }
}

impl ModelHandle {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn FeatureExtractor>> + Send + Sync + 'static,
    {
        Self::with_loader(Some(Box::new(loader)), State::Unloaded)
    }

    /// A handle with no pipeline behind it; the first acquire marks it failed.
    pub fn disabled() -> Self {
        Self::with_loader(None, State::Unloaded)
    }

    /// A handle around an extractor that is already loaded.
    pub fn ready(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self::with_loader(None, State::Ready(extractor))
    }

    fn with_loader(loader: Option<Box<Loader>>, state: State) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                state: Mutex::new(state),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.lock() {
            State::Unloaded => ModelStatus::Unloaded,
            State::Loading => ModelStatus::Loading,
            State::Ready(_) => ModelStatus::Ready,
            State::Failed(reason) => ModelStatus::Failed(reason.clone()),
        }
    }

    /// Return the extractor, loading it first if nobody has tried yet.
    pub fn acquire(
        &self,
        notifier: &dyn Notifier,
    ) -> Result<Arc<dyn FeatureExtractor>, ModelUnavailable> {
        let loader = {
            let mut state = self.lock();
            match &*state {
                State::Ready(extractor) => return Ok(extractor.clone()),
                State::Loading => return Err(ModelUnavailable::Loading),
                State::Failed(reason) => return Err(ModelUnavailable::Failed(reason.clone())),
                State::Unloaded => {}
            }
            match &self.inner.loader {
                Some(loader) => {
                    *state = State::Loading;
                    loader
                }
                None => {
                    let reason = "no analysis model configured".to_string();
                    *state = State::Failed(reason.clone());
                    drop(state);
                    notifier.notify(
                        Severity::Info,
                        "No analysis model configured, using image heuristics",
                    );
                    return Err(ModelUnavailable::Failed(reason));
                }
            }
        };

        notifier.notify(Severity::Info, "Loading leaf analysis model...");
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| loader())) {
            Ok(Ok(extractor)) => Ok(extractor),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err("model loader panicked".to_string()),
        };

        let mut state = self.lock();
        match outcome {
            Ok(extractor) => {
                *state = State::Ready(extractor.clone());
                drop(state);
                notifier.notify(Severity::Success, "Leaf analysis model loaded");
                Ok(extractor)
            }
            Err(reason) => {
                *state = State::Failed(reason.clone());
                drop(state);
                tracing::warn!("model load failed: {reason}");
                notifier.notify(
                    Severity::Error,
                    &format!("Could not load analysis model ({reason}), using image heuristics"),
                );
                Err(ModelUnavailable::Failed(reason))
            }
        }
    }
}
