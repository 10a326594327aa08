//! Shared server state handed to every request handler.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::hub::SnapshotHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: SnapshotHub,

    // Where the viewer's HTML/JS lives
    pub static_dir: Arc<PathBuf>,

    // Connected viewers, for logging
    pub viewer_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(hub: SnapshotHub, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            hub,
            static_dir: Arc::new(static_dir.into()),
            viewer_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}
