//! Error types for plugin hosting
//!
//! Structured errors for the control-context operations: bundle loading,
//! instantiation, activation, processing and editor creation. None of these
//! ever crosses into the audio context - audio-side misses surface as
//! `Option`/silent bypass.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during plugin hosting operations
#[derive(Debug, Error)]
pub enum HostError {
    /// Failed to load a plugin bundle
    #[error("Failed to load plugin bundle '{path}': {reason}")]
    BundleLoadFailed { path: PathBuf, reason: String },

    /// No descriptor matches the requested plugin id (or it is unavailable)
    #[error("Plugin '{plugin_id}' not found or unavailable")]
    PluginNotFound { plugin_id: String },

    /// Failed to instantiate a plugin
    #[error("Failed to instantiate plugin '{plugin_id}': {reason}")]
    InstantiationFailed { plugin_id: String, reason: String },

    /// Failed to activate a plugin for processing
    #[error("Failed to activate plugin '{plugin_id}': {reason}")]
    ActivationFailed { plugin_id: String, reason: String },

    /// Plugin is not activated
    #[error("Plugin '{plugin_id}' is not activated")]
    NotActivated { plugin_id: String },

    /// Audio processing error
    #[error("Audio processing error for plugin '{plugin_id}': {reason}")]
    ProcessingError { plugin_id: String, reason: String },

    /// Plugin does not expose an editor
    #[error("Plugin '{plugin_id}' does not support an editor")]
    EditorNotSupported { plugin_id: String },

    /// Failed to create the plugin editor
    #[error("Failed to create editor for plugin '{plugin_id}': {reason}")]
    EditorCreationFailed { plugin_id: String, reason: String },

    /// IO error during discovery or file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hosting operations
pub type HostResult<T> = Result<T, HostError>;
