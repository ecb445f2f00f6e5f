//! RT-safe garbage collection for instance snapshots
//!
//! This module provides a global `basedrop` collector that enables deferred
//! deallocation of instance-pool snapshots. When a `Shared<InstanceSnapshot>`
//! is dropped on the audio thread, it doesn't immediately free memory -
//! instead it enqueues the pointer for collection by a background GC thread.
//!
//! ## Why This Matters
//!
//! The audio thread holds a reference to the snapshot that was current at
//! block start. If the control thread publishes a replacement mid-block, the
//! audio thread's drop of the old snapshot would otherwise be the one that
//! frees it - and freeing (and destroying the plugin instances the snapshot
//! was the last holder of) must never happen under the block deadline.
//!
//! With `basedrop::Shared<T>`:
//! - Drop on RT thread: ~50ns (just enqueues a pointer)
//! - Actual deallocation: happens on GC thread where latency doesn't matter

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the GC thread drains the deferred-drop queue
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Global handle for creating Shared<T> allocations
///
/// This is initialized once and can be cloned cheaply.
/// The actual Collector lives on a dedicated GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    // Channel to send the handle from GC thread to the caller
    let (tx, rx) = mpsc::channel();

    // Spawn GC thread that owns the Collector
    thread::Builder::new()
        .name("triband-gc".to_string())
        .spawn(move || {
            // Create collector on this thread (Collector is !Sync)
            let mut collector = Collector::new();

            let handle = collector.handle();
            tx.send(handle).expect("Failed to send GC handle");

            log::info!("Snapshot GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn snapshot GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating Shared<T> allocations
///
/// Call this when you need to wrap a value in `Shared<T>`.
/// The handle is lightweight and can be cloned.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_allocation_through_global_handle() {
        let value = Shared::new(&gc_handle(), vec![1u32, 2, 3]);
        let clone = Shared::clone(&value);

        assert_eq!(*clone, vec![1, 2, 3]);

        // Both drops defer to the GC thread; neither frees inline
        drop(value);
        drop(clone);
    }
}
