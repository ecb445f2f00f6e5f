//! Send/return routing engine
//!
//! Fans the three band buffers into the shared pooled instances referenced
//! by the route table and mixes the wet results back, guaranteeing each
//! distinct instance processes at most once per block no matter how many
//! (band, slot) routes point at it.
//!
//! Runs entirely on the audio thread: the distinct-id scratch is a fixed
//! array, the auxiliary buffer is pre-sized at prepare time, instance access
//! is a try-lock on the snapshot entry. Anything missing or contended is
//! treated as temporarily unrouted for this block - never an error.

use crate::host::pool::{InstanceId, InstanceSnapshot};
use crate::types::{StereoBuffer, NUM_BANDS, NUM_SLOTS};

use super::routes::{RouteTable, NUM_ROUTES};

/// Send/return levels at or below this are skipped as negligible
///
/// A performance shortcut only: skipping a contribution this small changes
/// the output by no more than the epsilon itself.
pub const LEVEL_EPSILON: f32 = 1e-4;

/// Per-block send/return router
pub struct SendReturnRouter {
    /// Mixed send signal for the instance currently being processed
    aux: StereoBuffer,
    /// Distinct non-zero instance ids referenced by the route grid
    distinct: [InstanceId; NUM_ROUTES],
}

impl SendReturnRouter {
    pub fn new() -> Self {
        Self {
            aux: StereoBuffer::default(),
            distinct: [0; NUM_ROUTES],
        }
    }

    /// Pre-size the auxiliary buffer for the block size
    pub fn prepare(&mut self, block_size: usize) {
        self.aux = StereoBuffer::silence(block_size);
    }

    /// Route one block through the pooled instances
    ///
    /// `bands` contains the three processed band buffers; wet contributions
    /// are accumulated into them in place.
    pub fn process(
        &mut self,
        routes: &RouteTable,
        snapshot: &InstanceSnapshot,
        bands: &mut [StereoBuffer; NUM_BANDS],
    ) {
        let block_len = bands[0].len();

        // Gather the distinct instance ids across all band/slot routes
        let mut num_distinct = 0;
        for band in 0..NUM_BANDS {
            for slot in 0..NUM_SLOTS {
                let id = routes.route_instance(band, slot);
                if id == 0 {
                    continue;
                }
                if !self.distinct[..num_distinct].contains(&id) {
                    self.distinct[num_distinct] = id;
                    num_distinct += 1;
                }
            }
        }

        // For each distinct instance: sum all sends targeting it, process
        // once, then return the wet signal to every route that references it.
        for u in 0..num_distinct {
            let id = self.distinct[u];

            // Raced with destruction: temporarily unrouted for this block
            let Some(instance) = snapshot.get(id) else {
                continue;
            };
            // Contended with a control-thread mutation: skip this block
            let Ok(mut processor) = instance.try_lock() else {
                log::trace!("instance {} busy, skipping routes this block", id);
                continue;
            };

            self.aux.set_len_from_capacity(block_len);
            self.aux.fill_silence();

            for band in 0..NUM_BANDS {
                for slot in 0..NUM_SLOTS {
                    if routes.route_instance(band, slot) != id {
                        continue;
                    }
                    let send = routes.send_level(band, slot);
                    if send > LEVEL_EPSILON {
                        self.aux.accumulate_scaled(&bands[band], send);
                    }
                }
            }

            // Process even if every send was negligible; stateful plugins
            // (reverb tails, meters) still need to run on silence.
            if let Err(e) = processor.process_block(&mut self.aux) {
                log::trace!("instance {} failed to process: {}", id, e);
                continue;
            }

            for band in 0..NUM_BANDS {
                for slot in 0..NUM_SLOTS {
                    if routes.route_instance(band, slot) != id {
                        continue;
                    }
                    let ret = routes.return_level(band, slot);
                    if ret > LEVEL_EPSILON {
                        bands[band].accumulate_scaled(&self.aux, ret);
                    }
                }
            }
        }
    }
}

impl Default for SendReturnRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::pool::test_processors::*;
    use crate::host::pool::InstancePool;
    use crate::types::StereoSample;

    const BLOCK: usize = 64;

    fn band_buffers() -> [StereoBuffer; NUM_BANDS] {
        // Distinct, deterministic content per band
        let mut bands = [
            StereoBuffer::silence(BLOCK),
            StereoBuffer::silence(BLOCK),
            StereoBuffer::silence(BLOCK),
        ];
        for (b, band) in bands.iter_mut().enumerate() {
            for i in 0..BLOCK {
                let v = (b as f32 + 1.0) * 0.1 + i as f32 * 0.001;
                band[i] = StereoSample::new(v, -v);
            }
        }
        bands
    }

    fn router() -> SendReturnRouter {
        let mut router = SendReturnRouter::new();
        router.prepare(BLOCK);
        router
    }

    #[test]
    fn test_send_fan_in_is_weighted_sum() {
        // Two routes to the same instance with sends 0.5 and 0.3; with a
        // gain-2 processor and a single full return on band 2, band 2 gains
        // 2 * (0.5 * band0 + 0.3 * band1).
        let mut pool = InstancePool::new();
        let id = pool.create_instance_with(
            test_descriptor("org.test.gain2"),
            GainProcessor::new("org.test.gain2", 2.0),
        );

        let routes = RouteTable::new();
        routes.set_route_instance(0, 0, id);
        routes.set_send_level(0, 0, 0.5);
        routes.set_return_level(0, 0, 0.0);
        routes.set_route_instance(1, 0, id);
        routes.set_send_level(1, 0, 0.3);
        routes.set_return_level(1, 0, 0.0);
        routes.set_route_instance(2, 0, id);
        routes.set_send_level(2, 0, 0.0);
        routes.set_return_level(2, 0, 1.0);

        let mut bands = band_buffers();
        let before = bands.clone();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        for i in 0..BLOCK {
            let expected =
                before[2][i].left + 2.0 * (0.5 * before[0][i].left + 0.3 * before[1][i].left);
            assert!(
                (bands[2][i].left - expected).abs() < 1e-6,
                "sample {}: got {}, expected {}",
                i,
                bands[2][i].left,
                expected
            );
        }
        // Bands 0 and 1 had return level 0: unchanged
        for i in 0..BLOCK {
            assert_eq!(bands[0][i], before[0][i]);
            assert_eq!(bands[1][i], before[1][i]);
        }
    }

    #[test]
    fn test_return_fan_out_scales_per_route() {
        // Same wet signal returned to two bands at 0.4 and 1.0
        let mut pool = InstancePool::new();
        let id = pool.create_instance_with(
            test_descriptor("org.test.identity"),
            IdentityProcessor::new("org.test.identity"),
        );

        let routes = RouteTable::new();
        routes.set_route_instance(0, 0, id);
        routes.set_send_level(0, 0, 1.0);
        routes.set_return_level(0, 0, 0.4);
        routes.set_route_instance(1, 1, id);
        routes.set_send_level(1, 1, 0.0);
        routes.set_return_level(1, 1, 1.0);

        let mut bands = band_buffers();
        let before = bands.clone();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        // Wet = 1.0 * band0 (identity); band0 += 0.4*wet, band1 += 1.0*wet
        for i in 0..BLOCK {
            let wet = before[0][i].left;
            assert!((bands[0][i].left - (before[0][i].left + 0.4 * wet)).abs() < 1e-6);
            assert!((bands[1][i].left - (before[1][i].left + wet)).abs() < 1e-6);
            assert_eq!(bands[2][i], before[2][i]);
        }
    }

    #[test]
    fn test_instance_processes_once_for_many_routes() {
        // A gain-2 instance referenced by three routes must double the
        // mixed send exactly once, not once per route.
        let mut pool = InstancePool::new();
        let id = pool.create_instance_with(
            test_descriptor("org.test.gain2"),
            GainProcessor::new("org.test.gain2", 2.0),
        );

        let routes = RouteTable::new();
        for band in 0..NUM_BANDS {
            routes.set_route_instance(band, 0, id);
            routes.set_send_level(band, 0, 1.0);
            routes.set_return_level(band, 0, 0.0);
        }
        routes.set_return_level(2, 0, 1.0);

        let mut bands = band_buffers();
        let before = bands.clone();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        for i in 0..BLOCK {
            let mixed = before[0][i].left + before[1][i].left + before[2][i].left;
            let expected = before[2][i].left + 2.0 * mixed;
            assert!(
                (bands[2][i].left - expected).abs() < 1e-6,
                "gain applied more than once per block"
            );
        }
    }

    #[test]
    fn test_destroyed_instance_is_bypassed() {
        let mut pool = InstancePool::new();
        let id = pool.create_instance_with(
            test_descriptor("org.test.identity"),
            IdentityProcessor::new("org.test.identity"),
        );

        let routes = RouteTable::new();
        routes.set_route_instance(0, 0, id);
        routes.set_send_level(0, 0, 1.0);
        routes.set_return_level(0, 0, 1.0);

        pool.destroy_instance(id);

        let mut bands = band_buffers();
        let before = bands.clone();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        for (band, band_before) in bands.iter().zip(before.iter()) {
            for i in 0..BLOCK {
                assert_eq!(band[i], band_before[i]);
            }
        }
    }

    #[test]
    fn test_epsilon_skip_transparency() {
        // A send just below the epsilon is skipped; the resulting output
        // may differ from the unskipped ideal by at most epsilon * peak.
        let mut pool = InstancePool::new();
        let id = pool.create_instance_with(
            test_descriptor("org.test.identity"),
            IdentityProcessor::new("org.test.identity"),
        );

        let routes = RouteTable::new();
        routes.set_route_instance(0, 0, id);
        routes.set_send_level(0, 0, 0.00005);
        routes.set_return_level(0, 0, 1.0);

        let mut bands = band_buffers();
        let before = bands.clone();
        let peak = before[0].peak();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        for i in 0..BLOCK {
            let ideal = before[0][i].left + 0.00005 * before[0][i].left;
            assert!(
                (bands[0][i].left - ideal).abs() <= LEVEL_EPSILON * peak,
                "epsilon skip changed output beyond the epsilon bound"
            );
        }

        // A send just above the epsilon is applied
        routes.set_send_level(0, 0, 0.0002);
        let mut bands = band_buffers();
        let before = bands.clone();
        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);
        for i in 0..BLOCK {
            let expected = before[0][i].left * (1.0 + 0.0002);
            assert!((bands[0][i].left - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unrouted_grid_is_passthrough() {
        let pool = InstancePool::new();
        let routes = RouteTable::new();

        let mut bands = band_buffers();
        let before = bands.clone();

        let snapshot = pool.audio_snapshot();
        router().process(&routes, &snapshot, &mut bands);

        for (band, band_before) in bands.iter().zip(before.iter()) {
            for i in 0..BLOCK {
                assert_eq!(band[i], band_before[i]);
            }
        }
    }
}
