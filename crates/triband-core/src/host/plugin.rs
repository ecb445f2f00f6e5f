//! Low-level CLAP plugin wrapper using clack-host
//!
//! Wraps clack-host's API into the `InstanceProcessor` contract the pool
//! stores: prepare/release lifecycle, in-place stereo block processing and
//! floating editor windows.

use std::ffi::CString;
use std::sync::Arc;

use clack_extensions::gui::{GuiApiType, GuiConfiguration, PluginGui};
use clack_host::bundle::PluginBundle;
use clack_host::prelude::*;
use clack_host::process::StartedPluginAudioProcessor;

use crate::types::StereoBuffer;

use super::discovery::PluginDescriptor;
use super::error::{HostError, HostResult};
use super::pool::InstanceProcessor;

// ============================================================================
// Host Implementation
// ============================================================================

/// Triband's CLAP host implementation
pub struct TribandHost;

impl HostHandlers for TribandHost {
    type Shared<'a> = TribandHostShared;
    type MainThread<'a> = TribandHostMainThread<'a>;
    type AudioProcessor<'a> = ();

    fn declare_extensions(builder: &mut HostExtensions<Self>, _shared: &Self::Shared<'_>) {
        // No host-side extensions registered yet
        let _ = builder;
    }
}

/// Shared host data accessible from any thread
pub struct TribandHostShared {
    /// Plugin ID for logging
    plugin_id: String,
}

impl TribandHostShared {
    fn new(plugin_id: String) -> Self {
        Self { plugin_id }
    }
}

impl<'a> SharedHandler<'a> for TribandHostShared {
    fn initializing(&self, _instance: InitializingPluginHandle<'a>) {
        log::debug!("Plugin '{}' initializing", self.plugin_id);
    }

    fn request_restart(&self) {
        log::debug!("Plugin '{}' requested restart (ignored)", self.plugin_id);
    }

    fn request_process(&self) {
        // We're always processing, so this is a no-op
    }

    fn request_callback(&self) {
        log::trace!("Plugin '{}' requested callback (ignored)", self.plugin_id);
    }
}

/// Main thread host data
pub struct TribandHostMainThread<'a> {
    _shared: &'a TribandHostShared,
    plugin: Option<InitializedPluginHandle<'a>>,
}

impl<'a> TribandHostMainThread<'a> {
    fn new(shared: &'a TribandHostShared) -> Self {
        Self {
            _shared: shared,
            plugin: None,
        }
    }
}

impl<'a> MainThreadHandler<'a> for TribandHostMainThread<'a> {
    fn initialized(&mut self, instance: InitializedPluginHandle<'a>) {
        self.plugin = Some(instance);
    }
}

// ============================================================================
// Plugin Wrapper
// ============================================================================

/// A loaded CLAP plugin bound to the pool's processor contract
///
/// Handles the plugin lifecycle and provides in-place stereo block
/// processing. Created and destroyed on the control thread; `process_block`
/// is called on the audio thread through the pool snapshot's mutex.
pub struct ClapInstance {
    /// The plugin instance
    instance: Option<clack_host::plugin::PluginInstance<TribandHost>>,
    /// The audio processor (when activated)
    processor: Option<StartedPluginAudioProcessor<TribandHost>>,
    /// Descriptor this instance was created from
    descriptor: PluginDescriptor,
    /// Audio ports for input
    input_ports: AudioPorts,
    /// Audio ports for output
    output_ports: AudioPorts,
    /// Input buffer (non-interleaved: [L, L, L, ..., R, R, R, ...])
    input_buffer: Vec<f32>,
    /// Output buffer (non-interleaved: [L, L, L, ..., R, R, R, ...])
    output_buffer: Vec<f32>,
    /// Interleaved scratch for in-place processing
    scratch: Vec<f32>,
    /// Current buffer size
    block_size: usize,
    /// Sample rate
    sample_rate: u32,
    /// Whether the plugin is activated
    activated: bool,
    /// Whether an editor window is currently created
    editor_open: bool,
    /// Keep the bundle alive
    _bundle: Arc<PluginBundle>,
}

impl ClapInstance {
    /// Instantiate a plugin from its descriptor and loaded bundle
    pub fn new(descriptor: &PluginDescriptor, bundle: Arc<PluginBundle>) -> HostResult<Self> {
        let plugin_id = CString::new(descriptor.id.as_str()).map_err(|_| {
            HostError::InstantiationFailed {
                plugin_id: descriptor.id.clone(),
                reason: "Invalid plugin ID (contains null byte)".to_string(),
            }
        })?;

        let host_info = HostInfo::new(
            "Triband",
            "Triband Team",
            "https://github.com/triband",
            "0.1.0",
        )
        .map_err(|e| HostError::InstantiationFailed {
            plugin_id: descriptor.id.clone(),
            reason: format!("Failed to create host info: {:?}", e),
        })?;

        let cloned_id = descriptor.id.clone();
        let instance = clack_host::plugin::PluginInstance::<TribandHost>::new(
            |_| TribandHostShared::new(cloned_id.clone()),
            |shared| TribandHostMainThread::new(shared),
            &bundle,
            &plugin_id,
            &host_info,
        )
        .map_err(|e| HostError::InstantiationFailed {
            plugin_id: descriptor.id.clone(),
            reason: format!("{:?}", e),
        })?;

        Ok(Self {
            instance: Some(instance),
            processor: None,
            descriptor: descriptor.clone(),
            input_ports: AudioPorts::with_capacity(2, 1), // 2 channels, 1 port
            output_ports: AudioPorts::with_capacity(2, 1),
            input_buffer: Vec::new(),
            output_buffer: Vec::new(),
            scratch: Vec::new(),
            block_size: 0,
            sample_rate: 0,
            activated: false,
            editor_open: false,
            _bundle: bundle,
        })
    }

    /// The descriptor this instance was created from
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Activate the plugin for audio processing
    fn activate(&mut self, sample_rate: u32, block_size: usize) -> HostResult<()> {
        if self.activated {
            return Ok(());
        }

        let mut instance = self.instance.take().ok_or_else(|| HostError::NotActivated {
            plugin_id: self.descriptor.id.clone(),
        })?;

        self.sample_rate = sample_rate;
        self.block_size = block_size;

        // Pre-size all scratch buffers; the audio path never grows them
        let stereo_len = block_size * 2;
        self.input_buffer.resize(stereo_len, 0.0);
        self.output_buffer.resize(stereo_len, 0.0);
        self.scratch.resize(stereo_len, 0.0);

        let audio_config = PluginAudioConfiguration {
            sample_rate: sample_rate as f64,
            min_frames_count: 1,
            max_frames_count: block_size as u32,
        };

        // Activate the plugin - returns a StoppedPluginAudioProcessor
        let stopped_processor = instance
            .activate(|_, _| (), audio_config)
            .map_err(|e| HostError::ActivationFailed {
                plugin_id: self.descriptor.id.clone(),
                reason: format!("{:?}", e),
            })?;

        // Start processing - consumes Stopped, returns Started
        let processor =
            stopped_processor
                .start_processing()
                .map_err(|e| HostError::ActivationFailed {
                    plugin_id: self.descriptor.id.clone(),
                    reason: format!("Failed to start processing: {:?}", e),
                })?;

        self.instance = Some(instance);
        self.processor = Some(processor);
        self.activated = true;

        log::info!(
            "Plugin '{}' activated at {}Hz, block size {}",
            self.descriptor.id,
            sample_rate,
            block_size
        );

        Ok(())
    }

    /// Deactivate the plugin
    fn deactivate(&mut self) {
        if let Some(processor) = self.processor.take() {
            // Stop processing - returns StoppedPluginAudioProcessor
            let stopped = processor.stop_processing();

            // Deactivate via the instance (takes the stopped processor)
            if let Some(ref mut instance) = self.instance {
                instance.deactivate(stopped);
            }

            self.activated = false;
            log::info!("Plugin '{}' deactivated", self.descriptor.id);
        }
    }

    /// Process non-interleaved audio through the plugin
    ///
    /// Takes interleaved stereo input and produces interleaved stereo output.
    fn process(&mut self, input: &[f32], output: &mut [f32]) -> HostResult<()> {
        let processor = self.processor.as_mut().ok_or_else(|| HostError::NotActivated {
            plugin_id: self.descriptor.id.clone(),
        })?;

        let frame_count = input.len() / 2;
        if frame_count == 0 {
            return Ok(());
        }

        let stereo_len = frame_count * 2;
        if self.input_buffer.len() < stereo_len {
            self.input_buffer.resize(stereo_len, 0.0);
            self.output_buffer.resize(stereo_len, 0.0);
        }

        // Deinterleave input: [L, R, L, R, ...] -> [L, L, L, ..., R, R, R, ...]
        for i in 0..frame_count {
            self.input_buffer[i] = input[i * 2];
            self.input_buffer[frame_count + i] = input[i * 2 + 1];
        }

        self.output_buffer[..stereo_len].fill(0.0);

        // Split buffers to get non-overlapping mutable references for L/R channels
        let (input_left, input_right) =
            self.input_buffer[..stereo_len].split_at_mut(frame_count);
        let (output_left, output_right) =
            self.output_buffer[..stereo_len].split_at_mut(frame_count);

        let input_buffers =
            self.input_ports
                .with_input_buffers(std::iter::once(AudioPortBuffer {
                    latency: 0,
                    channels: AudioPortBufferType::f32_input_only(
                        [
                            InputChannel {
                                buffer: input_left,
                                is_constant: false,
                            },
                            InputChannel {
                                buffer: input_right,
                                is_constant: false,
                            },
                        ]
                        .into_iter(),
                    ),
                }));

        let mut output_buffers =
            self.output_ports
                .with_output_buffers(std::iter::once(AudioPortBuffer {
                    latency: 0,
                    channels: AudioPortBufferType::f32_output_only(
                        [output_left, output_right].into_iter(),
                    ),
                }));

        processor
            .process(
                &input_buffers,
                &mut output_buffers,
                &InputEvents::empty(),
                &mut OutputEvents::void(),
                None, // steady time
                None, // transport
            )
            .map_err(|e| HostError::ProcessingError {
                plugin_id: self.descriptor.id.clone(),
                reason: format!("{:?}", e),
            })?;

        // Interleave output: [L, L, L, ..., R, R, R, ...] -> [L, R, L, R, ...]
        for i in 0..frame_count {
            output[i * 2] = self.output_buffer[i];
            output[i * 2 + 1] = self.output_buffer[frame_count + i];
        }

        Ok(())
    }

    /// Fetch the plugin's GUI extension, if it exposes one
    fn gui_extension(&self) -> Option<PluginGui> {
        let instance = self.instance.as_ref()?;
        instance.access_handler(|mt| {
            mt.plugin
                .as_ref()
                .and_then(|plugin| plugin.get_extension::<PluginGui>())
        })
    }
}

impl InstanceProcessor for ClapInstance {
    fn prepare(&mut self, sample_rate: u32, block_size: usize) -> HostResult<()> {
        // Re-preparing at a new spec requires a full deactivate/activate cycle
        if self.activated {
            if self.sample_rate == sample_rate && self.block_size == block_size {
                return Ok(());
            }
            self.deactivate();
        }
        self.activate(sample_rate, block_size)
    }

    fn release(&mut self) {
        self.deactivate();
    }

    fn process_block(&mut self, buffer: &mut StereoBuffer) -> HostResult<()> {
        let stereo_len = buffer.len() * 2;
        if self.scratch.len() < stereo_len {
            self.scratch.resize(stereo_len, 0.0);
        }

        let interleaved = buffer.as_interleaved_mut();
        self.scratch[..stereo_len].copy_from_slice(&interleaved[..stereo_len]);

        // A self-borrow dance: process() reads from the scratch copy and
        // writes the wet result straight back into the caller's buffer.
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.process(&scratch[..stereo_len], interleaved);
        std::mem::swap(&mut self.scratch, &mut scratch);

        result
    }

    fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    fn has_editor(&mut self) -> bool {
        let Some(gui) = self.gui_extension() else {
            return false;
        };
        let Some(api_type) = GuiApiType::default_for_current_platform() else {
            return false;
        };
        let Some(instance) = self.instance.as_mut() else {
            return false;
        };

        let config = GuiConfiguration {
            api_type,
            is_floating: true,
        };
        gui.is_api_supported(&mut instance.plugin_handle(), config)
    }

    fn open_editor(&mut self) -> HostResult<()> {
        if self.editor_open {
            return Ok(());
        }

        let gui = self
            .gui_extension()
            .ok_or_else(|| HostError::EditorNotSupported {
                plugin_id: self.descriptor.id.clone(),
            })?;
        let api_type = GuiApiType::default_for_current_platform().ok_or_else(|| {
            HostError::EditorNotSupported {
                plugin_id: self.descriptor.id.clone(),
            }
        })?;
        let instance = self.instance.as_mut().ok_or_else(|| HostError::NotActivated {
            plugin_id: self.descriptor.id.clone(),
        })?;

        let config = GuiConfiguration {
            api_type,
            is_floating: true,
        };
        let mut handle = instance.plugin_handle();

        gui.create(&mut handle, config)
            .map_err(|e| HostError::EditorCreationFailed {
                plugin_id: self.descriptor.id.clone(),
                reason: format!("{:?}", e),
            })?;
        gui.show(&mut handle)
            .map_err(|e| HostError::EditorCreationFailed {
                plugin_id: self.descriptor.id.clone(),
                reason: format!("{:?}", e),
            })?;

        self.editor_open = true;
        log::info!("Editor opened for plugin '{}'", self.descriptor.id);
        Ok(())
    }

    fn close_editor(&mut self) {
        if !self.editor_open {
            return;
        }

        if let Some(gui) = self.gui_extension() {
            if let Some(instance) = self.instance.as_mut() {
                gui.destroy(&mut instance.plugin_handle());
            }
        }

        self.editor_open = false;
        log::info!("Editor closed for plugin '{}'", self.descriptor.id);
    }
}

impl Drop for ClapInstance {
    fn drop(&mut self) {
        self.close_editor();
        self.deactivate();
    }
}

// Safety: ClapInstance is Send because:
// - All fields are owned or use thread-safe synchronization
// - clack-host's PluginInstance and StartedPluginAudioProcessor are designed
//   to be moved between threads (though processing must happen on one thread
//   at a time, which the pool's mutex enforces)
unsafe impl Send for ClapInstance {}

#[cfg(test)]
mod tests {
    #[test]
    fn test_deinterleave_interleave() {
        // Test the deinterleave/interleave logic independently
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // [L1, R1, L2, R2, L3, R3]
        let frame_count = input.len() / 2;

        let mut deinterleaved = vec![0.0; input.len()];
        for i in 0..frame_count {
            deinterleaved[i] = input[i * 2];
            deinterleaved[frame_count + i] = input[i * 2 + 1];
        }
        assert_eq!(deinterleaved, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);

        let mut reinterleaved = vec![0.0; input.len()];
        for i in 0..frame_count {
            reinterleaved[i * 2] = deinterleaved[i];
            reinterleaved[i * 2 + 1] = deinterleaved[frame_count + i];
        }
        assert_eq!(reinterleaved, input.to_vec());
    }
}
