//! Plugin editor ownership
//!
//! `EditorHandle` is the opaque UI handle returned by the pool's editor
//! creation: a uniquely-owned resource transferred by move to the GUI layer.
//! The pool retains no reference to it; closing (or dropping) the handle
//! tears the plugin's window down through the instance it was created from.

use std::sync::{Arc, Mutex};

use super::error::HostResult;
use super::pool::InstanceProcessor;

/// Uniquely-owned handle to an open plugin editor
///
/// Holds its own reference to the instance so the window can be destroyed
/// even if the pool entry is removed first; the documented contract is still
/// to close editors before destroying their instance.
pub struct EditorHandle {
    plugin_id: String,
    instance: Arc<Mutex<dyn InstanceProcessor>>,
    open: bool,
}

impl EditorHandle {
    /// Open an editor on the given instance and wrap it in a handle
    ///
    /// Called by the pool on the control thread; the caller has already
    /// checked `has_editor`.
    pub(crate) fn open(
        plugin_id: String,
        instance: Arc<Mutex<dyn InstanceProcessor>>,
    ) -> HostResult<Self> {
        {
            let mut processor = instance.lock().expect("instance mutex poisoned");
            processor.open_editor()?;
        }
        Ok(Self {
            plugin_id,
            instance,
            open: true,
        })
    }

    /// The id of the plugin this editor belongs to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Whether the editor window is still open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the editor window
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Ok(mut processor) = self.instance.lock() {
            processor.close_editor();
        }
        self.open = false;
    }
}

impl Drop for EditorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EditorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorHandle")
            .field("plugin_id", &self.plugin_id)
            .field("open", &self.open)
            .finish()
    }
}
