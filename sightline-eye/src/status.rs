//! Visible viewer state published to the UI layer

use crate::models::{DownloadProgress, ProgressObserver};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Progress bar contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    Determinate { percent: f64 },
    /// Total size unknown; only the byte count is shown.
    Indeterminate { bytes_loaded: u64 },
}

impl From<DownloadProgress> for Progress {
    fn from(progress: DownloadProgress) -> Self {
        match progress.percent() {
            Some(percent) => Progress::Determinate { percent },
            None => Progress::Indeterminate {
                bytes_loaded: progress.bytes_loaded,
            },
        }
    }
}

/// Loading indicator.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoaderState {
    #[default]
    Hidden,
    /// Initial setup; covers the whole view.
    FullPage {
        message: String,
        progress: Option<Progress>,
    },
    /// Later updates; the live video stays visible underneath.
    Overlay {
        message: String,
        progress: Option<Progress>,
    },
}

impl LoaderState {
    pub fn is_visible(&self) -> bool {
        !matches!(self, LoaderState::Hidden)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            LoaderState::Hidden => None,
            LoaderState::FullPage { message, .. } | LoaderState::Overlay { message, .. } => Some(message),
        }
    }

    pub fn progress(&self) -> Option<&Progress> {
        match self {
            LoaderState::Hidden => None,
            LoaderState::FullPage { progress, .. } | LoaderState::Overlay { progress, .. } => progress.as_ref(),
        }
    }
}

/// Persistent, detailed failure report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub title: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViewState {
    pub loader: LoaderState,
    pub permission_overlay: bool,
    /// Transient, non-fatal message such as a failed rebuild.
    pub notice: Option<String>,
    pub fatal: Option<Diagnostic>,
}

/// Shared publisher of [`ViewState`].
#[derive(Clone)]
pub struct StatusBoard {
    sender: Arc<watch::Sender<ViewState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ViewState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ViewState {
        self.sender.borrow().clone()
    }

    pub fn show_full_page(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|state| {
            state.loader = LoaderState::FullPage {
                message,
                progress: None,
            }
        });
    }

    pub fn show_overlay(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|state| {
            state.loader = LoaderState::Overlay {
                message,
                progress: None,
            }
        });
    }

    /// Update the progress bar of whichever loader is showing.
    pub fn set_progress(&self, update: Progress) {
        self.sender.send_modify(|state| match &mut state.loader {
            LoaderState::FullPage { progress, .. } | LoaderState::Overlay { progress, .. } => {
                *progress = Some(update);
            }
            LoaderState::Hidden => {}
        });
    }

    pub fn hide_loader(&self) {
        self.sender.send_modify(|state| state.loader = LoaderState::Hidden);
    }

    pub fn set_permission_overlay(&self, visible: bool) {
        self.sender.send_modify(|state| state.permission_overlay = visible);
    }

    pub fn set_notice(&self, notice: Option<String>) {
        self.sender.send_modify(|state| state.notice = notice);
    }

    pub fn set_fatal(&self, title: impl Into<String>, details: impl Into<String>) {
        let diagnostic = Diagnostic {
            title: title.into(),
            details: details.into(),
        };
        self.sender.send_modify(|state| {
            state.loader = LoaderState::Hidden;
            state.fatal = Some(diagnostic);
        });
    }

    /// Progress observer feeding the loader bar.
    pub fn progress_observer(&self) -> LoaderProgress {
        LoaderProgress { board: self.clone() }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards download progress to a [`StatusBoard`] loader.
pub struct LoaderProgress {
    board: StatusBoard,
}

impl ProgressObserver for LoaderProgress {
    fn on_progress(&self, progress: DownloadProgress) {
        self.board.set_progress(progress.into());
    }
}
