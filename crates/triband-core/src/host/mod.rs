//! Plugin hosting - discovery, instance pool, host wrapper
//!
//! The `PluginHost` composes the pieces the control thread works with:
//! the descriptor registry fed by a background scan, the instance pool that
//! the audio thread reads through snapshots, and the convenience operations
//! for a single "primary" hosted instance (kept separate from the band-
//! routed instances the engine drives through the route table).

pub mod discovery;
pub mod editor;
pub mod error;
pub mod plugin;
pub mod pool;

pub use discovery::{Discovery, PluginDescriptor};
pub use editor::EditorHandle;
pub use error::{HostError, HostResult};
pub use plugin::ClapInstance;
pub use pool::{InstanceId, InstancePool, InstanceProcessor, InstanceSnapshot};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::TribandConfig;
use crate::types::StereoBuffer;

/// How long shutdown waits for the background scanner before abandoning it
const SCAN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running (or finished) background scan worker
struct ScannerHandle {
    join: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

/// The control-thread face of plugin hosting
///
/// Owns the descriptor registry and the instance pool. Everything here is
/// control-thread-only except `process_block`, which is the audio-thread
/// path for the primary hosted instance.
pub struct PluginHost {
    /// Descriptor registry, shared with the background scanner and any
    /// control-context readers. Never touched by the audio path.
    discovery: Arc<Mutex<Discovery>>,
    pool: InstancePool,
    /// Id of the primary hosted instance (0 = none)
    primary: AtomicU32,
    scan_finished: Arc<AtomicBool>,
    scan_cancel: Arc<AtomicBool>,
    scanner: Option<ScannerHandle>,
}

impl PluginHost {
    /// Create a host with the platform search paths plus any configured extras
    pub fn new(config: &TribandConfig) -> Self {
        let mut discovery = Discovery::new();
        for path in &config.search_paths {
            discovery.add_search_path(path.clone());
        }
        Self::with_discovery(discovery)
    }

    /// Create a host over an explicit discovery instance (used by tests)
    pub fn with_discovery(discovery: Discovery) -> Self {
        Self {
            discovery: Arc::new(Mutex::new(discovery)),
            pool: InstancePool::new(),
            primary: AtomicU32::new(0),
            scan_finished: Arc::new(AtomicBool::new(false)),
            scan_cancel: Arc::new(AtomicBool::new(false)),
            scanner: None,
        }
    }

    /// Establish the playback spec on the pool (re-prepares live instances)
    pub fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        self.pool.prepare(sample_rate, block_size);
    }

    /// Release playback resources on all pooled instances
    pub fn release(&mut self) {
        self.pool.release();
    }

    /// The instance pool (control-thread mutation surface)
    pub fn pool_mut(&mut self) -> &mut InstancePool {
        &mut self.pool
    }

    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────────────

    /// Start a background scan of the search paths
    ///
    /// No-op if a scan is already running. The scan runs without the
    /// registry lock and swaps its result in under it when done.
    pub fn start_background_scan(&mut self) {
        if self.scanner.is_some() && !self.scan_finished.load(Ordering::Relaxed) {
            log::debug!("Plugin scan already running");
            return;
        }
        // Reap a finished previous worker
        if let Some(handle) = self.scanner.take() {
            let _ = handle.join.join();
        }

        self.scan_finished.store(false, Ordering::Relaxed);
        self.scan_cancel.store(false, Ordering::Relaxed);

        let discovery = Arc::clone(&self.discovery);
        let finished = Arc::clone(&self.scan_finished);
        let cancel = Arc::clone(&self.scan_cancel);
        let (done_tx, done_rx) = mpsc::channel();

        let join = thread::Builder::new()
            .name("triband-scan".to_string())
            .spawn(move || {
                let paths = {
                    let registry = discovery.lock().expect("registry mutex poisoned");
                    registry.search_paths().to_vec()
                };

                let found = Discovery::scan_paths(&paths, &cancel);

                if cancel.load(Ordering::Relaxed) {
                    log::info!("Plugin scan cancelled before publishing results");
                } else {
                    discovery
                        .lock()
                        .expect("registry mutex poisoned")
                        .replace_descriptors(found);
                }

                finished.store(true, Ordering::Relaxed);
                let _ = done_tx.send(());
            })
            .expect("Failed to spawn plugin scan thread");

        self.scanner = Some(ScannerHandle { join, done_rx });
    }

    /// Whether the most recent background scan has completed
    pub fn is_scan_finished(&self) -> bool {
        self.scan_finished.load(Ordering::Relaxed)
    }

    /// Synchronously scan the search paths (tools and tests)
    pub fn scan_plugins(&mut self) {
        let paths = {
            let registry = self.discovery.lock().expect("registry mutex poisoned");
            registry.search_paths().to_vec()
        };
        let found = Discovery::scan_paths(&paths, &AtomicBool::new(false));
        self.discovery
            .lock()
            .expect("registry mutex poisoned")
            .replace_descriptors(found);
    }

    /// Add a plugin search path (takes effect on the next scan)
    pub fn add_search_path(&mut self, path: std::path::PathBuf) {
        self.discovery
            .lock()
            .expect("registry mutex poisoned")
            .add_search_path(path);
    }

    /// A copy of the currently known plugin descriptors
    pub fn known_plugins(&self) -> Vec<PluginDescriptor> {
        self.discovery
            .lock()
            .expect("registry mutex poisoned")
            .descriptors()
            .to_vec()
    }

    /// Signal the scan worker to stop and wait for it, bounded
    ///
    /// If the worker does not exit within the timeout, it is abandoned to
    /// process teardown (best-effort, documented tradeoff: a stuck scan must
    /// not hang host shutdown).
    fn stop_background_scan(&mut self) {
        let Some(handle) = self.scanner.take() else {
            return;
        };

        self.scan_cancel.store(true, Ordering::Relaxed);

        match handle.done_rx.recv_timeout(SCAN_JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = handle.join.join();
            }
            Err(_) => {
                log::warn!(
                    "Plugin scan did not stop within {:?}; abandoning worker",
                    SCAN_JOIN_TIMEOUT
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Primary hosted instance
    // ─────────────────────────────────────────────────────────────────────

    /// Load a plugin by id and make it the primary hosted instance
    ///
    /// Returns the pool id, or 0 if the plugin is unknown or failed to
    /// instantiate (the failure stays available via the pool's
    /// `take_last_error`).
    pub fn load_plugin(&mut self, plugin_id: &str) -> InstanceId {
        let descriptor = {
            let registry = self.discovery.lock().expect("registry mutex poisoned");
            registry.descriptor(plugin_id).cloned()
        };

        let Some(descriptor) = descriptor else {
            log::warn!("loadPlugin: unknown plugin id '{}'", plugin_id);
            return 0;
        };

        let id = self.pool.create_instance(&descriptor);
        if id != 0 {
            self.primary.store(id, Ordering::Relaxed);
        }
        id
    }

    /// Destroy the primary hosted instance, if any
    ///
    /// Any editor created for it must already be closed by its owner.
    pub fn unload_plugin(&mut self) {
        let id = self.primary.swap(0, Ordering::Relaxed);
        if id == 0 {
            return;
        }
        self.pool.destroy_instance(id);
    }

    /// Replace the primary hosted instance with a new plugin
    pub fn replace_plugin(&mut self, plugin_id: &str) -> InstanceId {
        self.unload_plugin();
        self.load_plugin(plugin_id)
    }

    /// The primary hosted instance id (0 = none)
    pub fn primary_instance_id(&self) -> InstanceId {
        self.primary.load(Ordering::Relaxed)
    }

    /// Point the primary slot at an existing pool instance
    pub fn set_primary_instance(&self, id: InstanceId) {
        self.primary.store(id, Ordering::Relaxed);
    }

    /// Create an editor for the primary hosted instance
    pub fn create_hosted_editor(&mut self) -> Option<EditorHandle> {
        let id = self.primary.load(Ordering::Relaxed);
        if id == 0 {
            return None;
        }
        self.pool.create_editor_for(id)
    }

    /// Process a block through the primary hosted instance. Audio thread.
    ///
    /// A no-op if no primary instance is set; if the instance cannot be
    /// resolved (pending destruction) or is briefly contended, the block
    /// passes through unchanged.
    pub fn process_block(&self, buffer: &mut StereoBuffer) {
        let id = self.primary.load(Ordering::Relaxed);
        if id == 0 {
            return;
        }

        let snapshot = self.pool.audio_snapshot();
        let Some(instance) = snapshot.get(id) else {
            return;
        };
        let Ok(mut processor) = instance.try_lock() else {
            return;
        };

        if let Err(e) = processor.process_block(buffer) {
            log::trace!("primary instance {} failed to process: {}", id, e);
        }
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.stop_background_scan();
        self.pool.release();
    }
}
