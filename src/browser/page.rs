use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::EmotionLabel;

/// The DOM of one page, reduced to the one element an agent may add.
#[derive(Clone, Default)]
pub struct PageSurface {
    overlay: Arc<Mutex<Option<String>>>,
}

impl PageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn overlay(&self) -> MutexGuard<'_, Option<String>> {
        match self.overlay.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn mount_overlay(&self) {
        *self.overlay() = Some("sensing…".to_string());
    }

    /// No-op when the overlay was never mounted or already removed.
    pub fn update_overlay(&self, label: EmotionLabel) {
        if let Some(text) = self.overlay().as_mut() {
            *text = label.as_str().to_string();
        }
    }

    pub fn remove_overlay(&self) {
        self.overlay().take();
    }

    pub fn overlay_text(&self) -> Option<String> {
        self.overlay().clone()
    }
}
