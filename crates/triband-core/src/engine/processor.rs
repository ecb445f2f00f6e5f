//! Band engine: the per-block processing front
//!
//! Owns the audio-side state (band buffers, splitter, router) and the
//! shared control surfaces (route table, engine params). Per block:
//! classify MIDI into bands, copy the input into three band buffers, filter
//! and gain each band, run the send/return routing through the pool
//! snapshot, then clear the output and sum the bands back into it.

use std::sync::Arc;

use basedrop::SharedCell;

use crate::host::pool::{InstancePool, InstanceSnapshot};
use crate::midi::{MidiBuffer, MidiMessage};
use crate::types::{StereoBuffer, NUM_BANDS};

use super::params::EngineParams;
use super::router::SendReturnRouter;
use super::routes::RouteTable;
use super::splitter::BandSplitter;

/// The real-time band processing engine
///
/// `prepare` and `process` run on the audio side; the route table and
/// engine params it holds are shared with the control thread, which mutates
/// them through their atomic setters.
pub struct BandEngine {
    params: Arc<EngineParams>,
    routes: Arc<RouteTable>,
    splitter: BandSplitter,
    router: SendReturnRouter,
    snapshot_cell: Arc<SharedCell<InstanceSnapshot>>,
    band_buffers: [StereoBuffer; NUM_BANDS],
    /// Running average note-on velocity per band (0-127)
    band_velocity: [u8; NUM_BANDS],
    /// Split frequencies last requested from the params, to detect retunes
    requested_low_mid: f32,
    requested_mid_high: f32,
}

impl BandEngine {
    /// Build an engine wired to a pool's snapshot and shared control state
    pub fn new(
        pool: &InstancePool,
        routes: Arc<RouteTable>,
        params: Arc<EngineParams>,
    ) -> Self {
        let low_mid = params.low_mid_hz();
        let mid_high = params.mid_high_hz();

        Self {
            splitter: BandSplitter::new(low_mid, mid_high),
            router: SendReturnRouter::new(),
            snapshot_cell: pool.snapshot_cell(),
            band_buffers: std::array::from_fn(|_| StereoBuffer::default()),
            band_velocity: [0; NUM_BANDS],
            requested_low_mid: low_mid,
            requested_mid_high: mid_high,
            params,
            routes,
        }
    }

    /// Establish the playback spec and pre-size every per-block buffer
    ///
    /// Removes per-block heap allocations: after this call, `process` works
    /// entirely within pre-allocated capacity.
    pub fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        self.splitter.prepare(sample_rate as f32);
        for buffer in &mut self.band_buffers {
            *buffer = StereoBuffer::silence(block_size);
        }
        self.router.prepare(block_size);
    }

    /// Reset filter state and velocity tracking (call when the stream restarts)
    pub fn reset(&mut self) {
        self.splitter.reset();
        self.band_velocity = [0; NUM_BANDS];
    }

    /// The average note-on velocity last observed for a band (0-127)
    pub fn band_velocity(&self, band: usize) -> u8 {
        self.band_velocity[band]
    }

    /// The clamped crossover pair currently in effect
    pub fn effective_splits(&self) -> (f32, f32) {
        self.splitter.effective_splits()
    }

    /// Process one audio block in place. Audio thread.
    pub fn process(&mut self, buffer: &mut StereoBuffer, midi: &MidiBuffer) {
        self.scan_midi(midi);
        self.maybe_retune();

        // Three copies of the input, one per band chain
        for band_buffer in &mut self.band_buffers {
            band_buffer.copy_from(buffer);
        }

        let [low, mid, high] = &mut self.band_buffers;
        self.splitter.process_bands(low, mid, high);

        // Per-band gain, read once per block (no interpolation; stepping at
        // block boundaries is accepted)
        for (band, band_buffer) in self.band_buffers.iter_mut().enumerate() {
            band_buffer.scale(self.params.band_gain(band));
        }

        // Send/return routing against the snapshot current at this block.
        // The Shared keeps every referenced instance alive until the end of
        // the block even if the control thread swaps the snapshot mid-block.
        let snapshot = self.snapshot_cell.get();
        self.router
            .process(&self.routes, &snapshot, &mut self.band_buffers);

        // Reassemble: dry band output plus any returned wet contribution.
        // The previous buffer contents are cleared first to avoid
        // double-counting the dry signal.
        buffer.fill_silence();
        for band_buffer in &self.band_buffers {
            buffer.add_buffer(band_buffer);
        }
    }

    /// Track per-band average note-on velocity
    fn scan_midi(&mut self, midi: &MidiBuffer) {
        let mut total = [0u32; NUM_BANDS];
        let mut count = [0u32; NUM_BANDS];

        for event in midi.iter() {
            if let MidiMessage::NoteOn { velocity, .. } = event.message {
                if let Some(band) = event.band() {
                    total[band as usize] += velocity as u32;
                    count[band as usize] += 1;
                }
            }
        }

        for band in 0..NUM_BANDS {
            if count[band] > 0 {
                self.band_velocity[band] = (total[band] / count[band]) as u8;
            }
        }
    }

    /// Pick up control-thread split changes and retune the crossover
    fn maybe_retune(&mut self) {
        let low_mid = self.params.low_mid_hz();
        let mid_high = self.params.mid_high_hz();

        if low_mid != self.requested_low_mid || mid_high != self.requested_mid_high {
            self.splitter.retune(low_mid, mid_high);
            self.requested_low_mid = low_mid;
            self.requested_mid_high = mid_high;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::pool::test_processors::*;
    use crate::midi::MidiEvent;
    use crate::types::StereoSample;

    const BLOCK: usize = 128;
    const SAMPLE_RATE: u32 = 48000;

    fn engine_for(pool: &InstancePool) -> (BandEngine, Arc<RouteTable>, Arc<EngineParams>) {
        let routes = Arc::new(RouteTable::new());
        let params = Arc::new(EngineParams::new());
        let mut engine = BandEngine::new(pool, Arc::clone(&routes), Arc::clone(&params));
        engine.prepare(SAMPLE_RATE, BLOCK);
        (engine, routes, params)
    }

    fn test_block(block: usize, seed: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(BLOCK);
        for i in 0..BLOCK {
            let x = ((i + block * BLOCK + seed) as f32 * 0.13).sin() * 0.5;
            buffer[i] = StereoSample::new(x, x * 0.7);
        }
        buffer
    }

    #[test]
    fn test_zero_level_routes_match_single_route_output() {
        // Three routes on the same instance with sends {1, 0, 0} and
        // returns {1, 0, 0} must be sample-identical to a single route.
        let mut pool_a = InstancePool::new();
        let id_a = pool_a.create_instance_with(
            test_descriptor("org.test.gain2"),
            GainProcessor::new("org.test.gain2", 2.0),
        );
        let (mut engine_a, routes_a, _) = engine_for(&pool_a);
        routes_a.set_route_instance(0, 0, id_a);
        routes_a.set_send_level(0, 0, 1.0);
        routes_a.set_return_level(0, 0, 1.0);
        routes_a.set_route_instance(0, 1, id_a);
        routes_a.set_send_level(0, 1, 0.0);
        routes_a.set_return_level(0, 1, 0.0);
        routes_a.set_route_instance(0, 2, id_a);
        routes_a.set_send_level(0, 2, 0.0);
        routes_a.set_return_level(0, 2, 0.0);

        let mut pool_b = InstancePool::new();
        let id_b = pool_b.create_instance_with(
            test_descriptor("org.test.gain2"),
            GainProcessor::new("org.test.gain2", 2.0),
        );
        let (mut engine_b, routes_b, _) = engine_for(&pool_b);
        routes_b.set_route_instance(0, 0, id_b);
        routes_b.set_send_level(0, 0, 1.0);
        routes_b.set_return_level(0, 0, 1.0);

        let midi = MidiBuffer::new();
        for block in 0..8 {
            let mut a = test_block(block, 0);
            let mut b = test_block(block, 0);
            engine_a.process(&mut a, &midi);
            engine_b.process(&mut b, &midi);
            for i in 0..BLOCK {
                assert_eq!(a[i], b[i], "outputs diverged at block {} sample {}", block, i);
            }
        }
    }

    #[test]
    fn test_unrouted_engine_reconstructs_dc() {
        // With no routes and unit gains, steady DC input reconstructs to
        // the band sum (close to the input after the filters settle).
        let pool = InstancePool::new();
        let (mut engine, _routes, params) = engine_for(&pool);
        for band in 0..NUM_BANDS {
            params.set_band_gain(band, 1.0);
        }

        let midi = MidiBuffer::new();
        let mut last = 0.0;
        for _ in 0..40 {
            let mut buffer = StereoBuffer::silence(BLOCK);
            for i in 0..BLOCK {
                buffer[i] = StereoSample::mono(1.0);
            }
            engine.process(&mut buffer, &midi);
            last = buffer[BLOCK - 1].left;
        }

        assert!((last - 1.0).abs() < 0.05, "expected near-unity reconstruction, got {}", last);
    }

    #[test]
    fn test_band_gain_scales_output() {
        let pool = InstancePool::new();
        let (mut engine, _routes, params) = engine_for(&pool);
        for band in 0..NUM_BANDS {
            params.set_band_gain(band, 0.0);
        }

        let midi = MidiBuffer::new();
        let mut buffer = test_block(0, 7);
        engine.process(&mut buffer, &midi);

        for i in 0..BLOCK {
            assert_eq!(buffer[i], StereoSample::silence());
        }
    }

    #[test]
    fn test_split_change_is_picked_up_next_block() {
        let pool = InstancePool::new();
        let (mut engine, _routes, params) = engine_for(&pool);

        let midi = MidiBuffer::new();
        let mut buffer = test_block(0, 0);
        engine.process(&mut buffer, &midi);
        assert_eq!(engine.effective_splits(), (250.0, 4000.0));

        params.set_band_splits(500.0, 6000.0);
        let mut buffer = test_block(1, 0);
        engine.process(&mut buffer, &midi);
        assert_eq!(engine.effective_splits(), (500.0, 6000.0));
    }

    #[test]
    fn test_midi_velocity_tracking_per_band() {
        let pool = InstancePool::new();
        let (mut engine, _routes, _params) = engine_for(&pool);

        let mut midi = MidiBuffer::new();
        midi.push(MidiEvent::new(0, MidiMessage::NoteOn { note: 30, velocity: 100 }));
        midi.push(MidiEvent::new(4, MidiMessage::NoteOn { note: 36, velocity: 50 }));
        midi.push(MidiEvent::new(8, MidiMessage::NoteOn { note: 60, velocity: 90 }));
        midi.push(MidiEvent::new(12, MidiMessage::NoteOn { note: 100, velocity: 10 }));
        midi.push(MidiEvent::new(16, MidiMessage::NoteOff { note: 30 }));

        let mut buffer = test_block(0, 0);
        engine.process(&mut buffer, &midi);

        assert_eq!(engine.band_velocity(0), 75); // (100 + 50) / 2
        assert_eq!(engine.band_velocity(1), 90);
        assert_eq!(engine.band_velocity(2), 10);

        // A block with no note-ons keeps the previous averages
        let empty = MidiBuffer::new();
        let mut buffer = test_block(1, 0);
        engine.process(&mut buffer, &empty);
        assert_eq!(engine.band_velocity(0), 75);
    }

    #[test]
    fn test_short_tail_block_is_processed() {
        // Hosts may deliver a final block shorter than the prepared size
        let pool = InstancePool::new();
        let (mut engine, _routes, _params) = engine_for(&pool);

        let midi = MidiBuffer::new();
        let mut buffer = StereoBuffer::silence(BLOCK / 4);
        for i in 0..BLOCK / 4 {
            buffer[i] = StereoSample::mono(0.25);
        }
        engine.process(&mut buffer, &midi);
        assert_eq!(buffer.len(), BLOCK / 4);
        for i in 0..BLOCK / 4 {
            assert!(buffer[i].left.is_finite());
        }
    }
}
