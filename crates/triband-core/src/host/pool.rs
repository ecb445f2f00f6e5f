//! Instance pool: plugin lifecycle with a lock-free audio read path
//!
//! The pool owns every loaded plugin instance. The control thread is the
//! sole mutator of the authoritative store; the audio thread only ever sees
//! the copy-on-write `InstanceSnapshot`, published through a
//! `basedrop::SharedCell` after every mutation. A snapshot captured at block
//! start stays valid for the whole block even if the control thread swaps it
//! out mid-block - the replaced snapshot (and any instance it was the last
//! holder of) is freed later by the GC thread, never on the audio thread.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use basedrop::{Shared, SharedCell};
use clack_host::bundle::PluginBundle;

use crate::engine::gc::gc_handle;
use crate::types::StereoBuffer;

use super::discovery::PluginDescriptor;
use super::editor::EditorHandle;
use super::error::{HostError, HostResult};
use super::plugin::ClapInstance;

/// Unique identifier for a pooled instance
///
/// Never 0 (0 is the "no instance" sentinel in route cells and return
/// values), monotonically assigned and never reused within a process.
pub type InstanceId = u32;

/// DSP unit owned by the pool
///
/// Implemented by the CLAP-backed `ClapInstance` and by host- or
/// test-supplied processors inserted through `create_instance_with`. The
/// editor methods are only invoked after `has_editor` returned true.
pub trait InstanceProcessor: Send {
    /// (Re)activate for playback at the given spec. Control thread.
    fn prepare(&mut self, sample_rate: u32, block_size: usize) -> HostResult<()>;

    /// Deactivate and release playback resources. Control thread.
    fn release(&mut self);

    /// Process one stereo block in place. Audio thread, under the pool
    /// snapshot's try-lock.
    fn process_block(&mut self, buffer: &mut StereoBuffer) -> HostResult<()>;

    /// The plugin type identity string this processor was created from.
    fn plugin_id(&self) -> &str;

    /// Whether the plugin exposes an editor window.
    fn has_editor(&mut self) -> bool {
        false
    }

    /// Create and show the editor window. Control thread.
    fn open_editor(&mut self) -> HostResult<()> {
        Ok(())
    }

    /// Destroy the editor window. Control thread.
    fn close_editor(&mut self) {}
}

/// Immutable point-in-time view of all live instances
///
/// Built by the control thread on every pool mutation, read by the audio
/// thread. Once published it is never mutated; lookups are a linear scan
/// over a handful of entries.
pub struct InstanceSnapshot {
    items: Vec<(InstanceId, Arc<Mutex<dyn InstanceProcessor>>)>,
}

impl InstanceSnapshot {
    fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Look up an instance by id
    ///
    /// Audio-thread-safe: no allocation, no locking. Returns `None` if the
    /// id is absent (unrouted, or destroyed since this snapshot was built).
    #[inline]
    pub fn get(&self, id: InstanceId) -> Option<&Arc<Mutex<dyn InstanceProcessor>>> {
        if id == 0 {
            return None;
        }
        self.items
            .iter()
            .find(|(item_id, _)| *item_id == id)
            .map(|(_, processor)| processor)
    }

    /// Number of live instances in this snapshot
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One authoritative pool entry
struct Entry {
    descriptor: PluginDescriptor,
    processor: Arc<Mutex<dyn InstanceProcessor>>,
}

/// Pool of loaded plugin instances
///
/// All methods except the snapshot accessors are control-thread-only.
pub struct InstancePool {
    /// Control-thread-owned authoritative storage
    entries: HashMap<InstanceId, Entry>,
    /// Next id to mint; ids start at 1 and are never reused
    next_id: InstanceId,
    /// Audio-thread-readable snapshot
    snapshot: Arc<SharedCell<InstanceSnapshot>>,
    /// Cache of loaded plugin bundles (path -> Arc for sharing)
    bundle_cache: HashMap<PathBuf, Arc<PluginBundle>>,
    /// Most recent instantiation failure, for the caller's diagnostics
    last_error: Option<HostError>,
    sample_rate: u32,
    block_size: usize,
}

impl InstancePool {
    pub fn new() -> Self {
        let handle = gc_handle();
        Self {
            entries: HashMap::new(),
            next_id: 1,
            snapshot: Arc::new(SharedCell::new(Shared::new(
                &handle,
                InstanceSnapshot::empty(),
            ))),
            bundle_cache: HashMap::new(),
            last_error: None,
            sample_rate: crate::types::DEFAULT_SAMPLE_RATE,
            block_size: 512,
        }
    }

    /// Set the playback spec and re-prepare all live instances
    pub fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;

        for (id, entry) in &self.entries {
            let mut processor = entry.processor.lock().expect("instance mutex poisoned");
            if let Err(e) = processor.prepare(sample_rate, block_size) {
                log::warn!("Failed to re-prepare instance {}: {}", id, e);
            }
        }
    }

    /// Release playback resources on all live instances
    pub fn release(&mut self) {
        for entry in self.entries.values() {
            entry
                .processor
                .lock()
                .expect("instance mutex poisoned")
                .release();
        }
    }

    /// Instantiate a plugin and add it to the pool
    ///
    /// Returns the freshly minted id, or 0 if instantiation failed; the
    /// failure is logged and kept for `take_last_error`. Control thread.
    pub fn create_instance(&mut self, descriptor: &PluginDescriptor) -> InstanceId {
        match self.instantiate(descriptor) {
            Ok(processor) => self.create_instance_with(descriptor.clone(), processor),
            Err(e) => {
                log::error!("createInstance failed for '{}': {}", descriptor.id, e);
                self.last_error = Some(e);
                0
            }
        }
    }

    /// Add an externally constructed processor to the pool
    ///
    /// Seam for hosts that build their own processors, and for tests that
    /// inject known-behavior stubs.
    pub fn create_instance_with<P>(&mut self, descriptor: PluginDescriptor, processor: P) -> InstanceId
    where
        P: InstanceProcessor + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let processor: Arc<Mutex<dyn InstanceProcessor>> = Arc::new(Mutex::new(processor));
        self.entries.insert(
            id,
            Entry {
                descriptor,
                processor,
            },
        );

        self.rebuild_snapshot();
        id
    }

    /// Remove an instance (no-op if the id is unknown)
    ///
    /// Any editor bound to this instance must already be closed by its
    /// owner; the pool does not track editor lifetime. Control thread.
    pub fn destroy_instance(&mut self, id: InstanceId) {
        if self.entries.remove(&id).is_none() {
            return;
        }
        self.rebuild_snapshot();
    }

    /// Remove every instance
    pub fn destroy_all(&mut self) {
        self.entries.clear();
        self.rebuild_snapshot();
    }

    /// Create an editor for an instance
    ///
    /// Returns `None` if the id is unknown or the plugin exposes no editor.
    /// Ownership of the handle transfers to the caller; the pool keeps no
    /// reference to it. Control thread.
    pub fn create_editor_for(&mut self, id: InstanceId) -> Option<EditorHandle> {
        let entry = self.entries.get(&id)?;

        {
            let mut processor = entry.processor.lock().expect("instance mutex poisoned");
            if !processor.has_editor() {
                return None;
            }
        }

        match EditorHandle::open(entry.descriptor.id.clone(), Arc::clone(&entry.processor)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Editor creation failed for instance {}: {}", id, e);
                self.last_error = Some(e);
                None
            }
        }
    }

    /// The snapshot cell, for the audio engine to hold its own reference
    pub fn snapshot_cell(&self) -> Arc<SharedCell<InstanceSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Load the current snapshot
    ///
    /// Audio-thread-safe: lock-free, non-allocating. The returned `Shared`
    /// keeps the snapshot (and every instance in it) alive until dropped;
    /// the drop itself only enqueues for the GC thread.
    pub fn audio_snapshot(&self) -> Shared<InstanceSnapshot> {
        self.snapshot.get()
    }

    /// Whether an id is present in the authoritative store
    pub fn has_instance(&self, id: InstanceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The descriptor an instance was created from
    pub fn descriptor_for(&self, id: InstanceId) -> Option<&PluginDescriptor> {
        self.entries.get(&id).map(|e| &e.descriptor)
    }

    /// All ids whose instances share the given plugin type identity
    pub fn find_instances_by_type(&self, plugin_id: &str) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.descriptor.id == plugin_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent control-thread failure, if any
    pub fn take_last_error(&mut self) -> Option<HostError> {
        self.last_error.take()
    }

    /// Load a CLAP plugin and prepare it at the current spec
    fn instantiate(&mut self, descriptor: &PluginDescriptor) -> HostResult<ClapInstance> {
        if !descriptor.available {
            return Err(HostError::PluginNotFound {
                plugin_id: descriptor.id.clone(),
            });
        }

        let bundle = self.bundle_for(&descriptor.bundle_path)?;
        let mut instance = ClapInstance::new(descriptor, bundle)?;
        instance.prepare(self.sample_rate, self.block_size)?;
        Ok(instance)
    }

    /// Load a plugin bundle from path, caching for reuse
    fn bundle_for(&mut self, path: &PathBuf) -> HostResult<Arc<PluginBundle>> {
        if let Some(bundle) = self.bundle_cache.get(path) {
            return Ok(Arc::clone(bundle));
        }

        let bundle = unsafe {
            PluginBundle::load(path).map_err(|e| HostError::BundleLoadFailed {
                path: path.clone(),
                reason: format!("{:?}", e),
            })?
        };

        let bundle = Arc::new(bundle);
        self.bundle_cache.insert(path.clone(), Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Build and publish a fresh snapshot of the live instances
    fn rebuild_snapshot(&mut self) {
        let mut items: Vec<(InstanceId, Arc<Mutex<dyn InstanceProcessor>>)> =
            Vec::with_capacity(self.entries.len());

        for (id, entry) in &self.entries {
            items.push((*id, Arc::clone(&entry.processor)));
        }

        let snapshot = Shared::new(&gc_handle(), InstanceSnapshot { items });
        self.snapshot.set(snapshot);
    }
}

impl Default for InstancePool {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_processors::*;
    use super::*;

    fn pool_with_identity(id: &str) -> (InstancePool, InstanceId) {
        let mut pool = InstancePool::new();
        let instance_id = pool.create_instance_with(
            test_descriptor(id),
            IdentityProcessor::new(id),
        );
        (pool, instance_id)
    }

    #[test]
    fn test_create_then_lookup_then_destroy() {
        let (mut pool, id) = pool_with_identity("org.test.identity");
        assert_ne!(id, 0);

        let snapshot = pool.audio_snapshot();
        assert!(snapshot.get(id).is_some());

        pool.destroy_instance(id);
        let snapshot = pool.audio_snapshot();
        assert!(snapshot.get(id).is_none());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut pool = InstancePool::new();
        let mut ids = Vec::new();

        for i in 0..5 {
            let id = pool.create_instance_with(
                test_descriptor(&format!("org.test.p{}", i)),
                IdentityProcessor::new("p"),
            );
            ids.push(id);
        }

        for &id in &ids {
            pool.destroy_instance(id);
        }
        assert!(pool.is_empty());

        let fresh = pool.create_instance_with(
            test_descriptor("org.test.fresh"),
            IdentityProcessor::new("fresh"),
        );
        let max_old = ids.iter().copied().max().unwrap();
        assert!(fresh > max_old, "id {} reused (max previous {})", fresh, max_old);
    }

    #[test]
    fn test_snapshot_survives_destroy() {
        let (mut pool, id) = pool_with_identity("org.test.identity");

        // Capture a snapshot, then destroy the instance behind it
        let held = pool.audio_snapshot();
        pool.destroy_instance(id);

        // The held snapshot still resolves and the instance still processes
        let processor = held.get(id).expect("held snapshot must stay valid");
        let mut buffer = StereoBuffer::silence(16);
        processor
            .try_lock()
            .expect("no contention in test")
            .process_block(&mut buffer)
            .unwrap();

        // A freshly loaded snapshot no longer contains the id
        assert!(pool.audio_snapshot().get(id).is_none());
    }

    #[test]
    fn test_zero_id_never_resolves() {
        let (pool, _id) = pool_with_identity("org.test.identity");
        assert!(pool.audio_snapshot().get(0).is_none());
    }

    #[test]
    fn test_destroy_unknown_is_noop() {
        let (mut pool, id) = pool_with_identity("org.test.identity");
        pool.destroy_instance(9999);
        assert!(pool.has_instance(id));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_find_instances_by_type() {
        let mut pool = InstancePool::new();
        let a = pool.create_instance_with(
            test_descriptor("org.test.comp"),
            IdentityProcessor::new("comp"),
        );
        let b = pool.create_instance_with(
            test_descriptor("org.test.verb"),
            IdentityProcessor::new("verb"),
        );
        let c = pool.create_instance_with(
            test_descriptor("org.test.comp"),
            IdentityProcessor::new("comp"),
        );

        assert_eq!(pool.find_instances_by_type("org.test.comp"), vec![a, c]);
        assert_eq!(pool.find_instances_by_type("org.test.verb"), vec![b]);
        assert!(pool.find_instances_by_type("org.test.none").is_empty());
    }

    #[test]
    fn test_destroy_all() {
        let mut pool = InstancePool::new();
        for i in 0..3 {
            pool.create_instance_with(
                test_descriptor(&format!("org.test.p{}", i)),
                IdentityProcessor::new("p"),
            );
        }
        assert_eq!(pool.len(), 3);

        pool.destroy_all();
        assert!(pool.is_empty());
        assert!(pool.audio_snapshot().is_empty());
    }

    #[test]
    fn test_editor_for_editorless_instance_is_none() {
        let (mut pool, id) = pool_with_identity("org.test.identity");
        assert!(pool.create_editor_for(id).is_none());
        assert!(pool.create_editor_for(4242).is_none());
    }
}
