//! Route table: the 3x3 band/slot routing grid
//!
//! Each (band, slot) cell binds to a pooled plugin instance id (0 = not
//! routed) plus a send and a return level. The control thread writes cells
//! through the clamping setters; the audio thread reads them with relaxed
//! atomic loads every block. The three fields of a cell are independently
//! meaningful, so no cross-field ordering is needed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::host::pool::InstanceId;
use crate::types::{NUM_BANDS, NUM_SLOTS};

/// Total number of route cells in the grid
pub const NUM_ROUTES: usize = NUM_BANDS * NUM_SLOTS;

/// A plain (non-atomic) view of one route cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub instance_id: InstanceId,
    pub send_level: f32,
    pub return_level: f32,
}

/// One cell of atomic route storage
struct RouteCell {
    instance_id: AtomicU32,
    /// Send level in f32 bits
    send_level: AtomicU32,
    /// Return level in f32 bits
    return_level: AtomicU32,
}

impl RouteCell {
    fn new() -> Self {
        Self {
            instance_id: AtomicU32::new(0),
            send_level: AtomicU32::new(0.0f32.to_bits()),
            return_level: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

/// The shared routing grid
///
/// Single writer (control thread), many readers (audio thread, UI). Cells
/// default to unrouted with send 0.0 and return 1.0.
pub struct RouteTable {
    cells: [[RouteCell; NUM_SLOTS]; NUM_BANDS],
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            cells: std::array::from_fn(|_| std::array::from_fn(|_| RouteCell::new())),
        }
    }

    /// Bind a route cell to a pooled instance (0 unroutes the cell)
    pub fn set_route_instance(&self, band: usize, slot: usize, id: InstanceId) {
        self.cell(band, slot).instance_id.store(id, Ordering::Relaxed);
    }

    /// Set a route's send level, clamped to [0, 1]
    pub fn set_send_level(&self, band: usize, slot: usize, level: f32) {
        self.cell(band, slot)
            .send_level
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Set a route's return level, clamped to [0, 1]
    pub fn set_return_level(&self, band: usize, slot: usize, level: f32) {
        self.cell(band, slot)
            .return_level
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// The instance id a cell is bound to (0 = unrouted)
    #[inline]
    pub fn route_instance(&self, band: usize, slot: usize) -> InstanceId {
        self.cell(band, slot).instance_id.load(Ordering::Relaxed)
    }

    /// A cell's send level
    #[inline]
    pub fn send_level(&self, band: usize, slot: usize) -> f32 {
        f32::from_bits(self.cell(band, slot).send_level.load(Ordering::Relaxed))
    }

    /// A cell's return level
    #[inline]
    pub fn return_level(&self, band: usize, slot: usize) -> f32 {
        f32::from_bits(self.cell(band, slot).return_level.load(Ordering::Relaxed))
    }

    /// A plain copy of one cell (for UI display)
    pub fn route(&self, band: usize, slot: usize) -> Route {
        Route {
            instance_id: self.route_instance(band, slot),
            send_level: self.send_level(band, slot),
            return_level: self.return_level(band, slot),
        }
    }

    /// Unroute every cell that points at the given instance id
    ///
    /// Called by the control thread before destroying an instance so the
    /// audio thread stops referencing it in the same block the routes change.
    pub fn clear_instance(&self, id: InstanceId) {
        if id == 0 {
            return;
        }
        for band in 0..NUM_BANDS {
            for slot in 0..NUM_SLOTS {
                let cell = self.cell(band, slot);
                let _ = cell.instance_id.compare_exchange(
                    id,
                    0,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
        }
    }

    #[inline]
    fn cell(&self, band: usize, slot: usize) -> &RouteCell {
        assert!(band < NUM_BANDS && slot < NUM_SLOTS, "route index out of range");
        &self.cells[band][slot]
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
