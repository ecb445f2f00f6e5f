//! Triband Core - real-time core of a three-band plugin-hosting effect
//!
//! Splits incoming audio into three frequency bands, applies per-band gain,
//! and routes each band through up to three send/return slots into shared
//! third-party plugin instances, while instance lifecycle runs on a control
//! thread that never blocks the audio thread.
//!
//! # Architecture
//!
//! ```text
//!            control thread                        audio thread
//!  ┌─────────────────────────────┐      ┌──────────────────────────────┐
//!  │ PluginHost                  │      │ BandEngine                   │
//!  │  - Discovery (+ bg scan)    │      │  - BandSplitter (crossover)  │
//!  │  - InstancePool ────────────┼──────┼─► snapshot (lock-free read)  │
//!  │  - primary instance         │      │  - SendReturnRouter          │
//!  │ RouteTable / EngineParams ◄─┼──────┼── atomic loads per block     │
//!  └─────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use triband_core::config::TribandConfig;
//! use triband_core::engine::{BandEngine, EngineParams, RouteTable};
//! use triband_core::host::PluginHost;
//!
//! let config = TribandConfig::load_default();
//! let mut host = PluginHost::new(&config);
//! host.start_background_scan();
//!
//! let routes = Arc::new(RouteTable::new());
//! let params = Arc::new(EngineParams::new());
//! config.apply(&params);
//!
//! let mut engine = BandEngine::new(host.pool(), Arc::clone(&routes), Arc::clone(&params));
//!
//! // At prepare time (control thread):
//! host.prepare(48000, 512);
//! engine.prepare(48000, 512);
//!
//! // Per block (audio thread):
//! // engine.process(&mut buffer, &midi);
//! ```

pub mod config;
pub mod engine;
pub mod host;
pub mod midi;
pub mod types;

pub use types::*;
