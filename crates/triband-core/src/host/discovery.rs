//! Plugin discovery
//!
//! Scans CLAP plugin directories and enumerates bundle factories into
//! `PluginDescriptor`s, the only input the instance pool consumes to create
//! instances. A bundle that fails to load is recorded as an unavailable
//! descriptor with its failure reason and the scan continues.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{HostError, HostResult};

/// Standard CLAP plugin search paths on Linux
const CLAP_SEARCH_PATHS: &[&str] = &[
    // User plugins
    "~/.clap",
    // System plugins
    "/usr/lib/clap",
    "/usr/local/lib/clap",
];

/// Identifying metadata for a discoverable plugin
///
/// `id` is the unique type identity string (e.g. "org.lsp-plug.compressor");
/// everything else is display metadata.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique plugin identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Plugin vendor/author
    pub vendor: String,
    /// Plugin version string
    pub version: String,
    /// Path to the .clap bundle
    pub bundle_path: PathBuf,
    /// Whether the bundle loaded and enumerated successfully
    pub available: bool,
    /// Error message if the bundle failed to load
    pub error_message: Option<String>,
}

impl PluginDescriptor {
    /// Create a placeholder for a bundle that failed to load
    pub fn unavailable(bundle_path: PathBuf, error: String) -> Self {
        let name = bundle_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            id: format!("unknown:{}", name),
            name,
            vendor: "Unknown".to_string(),
            version: "0.0.0".to_string(),
            bundle_path,
            available: false,
            error_message: Some(error),
        }
    }
}

/// Plugin discovery and descriptor registry
///
/// Owned by the host wrapper behind a mutex shared only with control-context
/// readers; the background scanner builds a fresh descriptor list and swaps
/// it in under that lock.
pub struct Discovery {
    /// Search paths for plugin bundles
    search_paths: Vec<PathBuf>,
    /// Descriptors by plugin id
    by_id: HashMap<String, PluginDescriptor>,
    /// All discovered descriptors in display order
    descriptors: Vec<PluginDescriptor>,
    /// Whether a scan has completed
    scanned: bool,
}

impl Discovery {
    /// Create a new discovery instance with the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
            by_id: HashMap::new(),
            descriptors: Vec::new(),
            scanned: false,
        }
    }

    /// Create with custom search paths (for testing)
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths: paths,
            by_id: HashMap::new(),
            descriptors: Vec::new(),
            scanned: false,
        }
    }

    /// Get default search paths, expanding ~ to home directory
    fn default_search_paths() -> Vec<PathBuf> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/home"));

        CLAP_SEARCH_PATHS
            .iter()
            .map(|p| {
                if let Some(stripped) = p.strip_prefix("~/") {
                    home.join(stripped)
                } else {
                    PathBuf::from(p)
                }
            })
            .filter(|p| p.exists())
            .collect()
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
            // Invalidate cache
            self.scanned = false;
        }
    }

    /// Get current search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Synchronously scan all search paths and replace the registry
    pub fn scan(&mut self) -> &[PluginDescriptor] {
        let paths = self.search_paths.clone();
        let found = Self::scan_paths(&paths, &AtomicBool::new(false));
        self.replace_descriptors(found);
        &self.descriptors
    }

    /// Replace the registry contents with a freshly scanned descriptor list
    ///
    /// Used by the background scanner: the scan runs without the registry
    /// lock, then this swap happens under it.
    pub fn replace_descriptors(&mut self, mut descriptors: Vec<PluginDescriptor>) {
        // Sort by name for consistent ordering
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        self.by_id.clear();
        for descriptor in &descriptors {
            if descriptor.available {
                self.by_id.insert(descriptor.id.clone(), descriptor.clone());
            }
        }
        self.descriptors = descriptors;
        self.scanned = true;
    }

    /// Scan a set of directories for plugin bundles
    ///
    /// Free function so the background worker can run it without holding the
    /// registry lock. The cancel flag is checked between bundles; a
    /// cancelled scan returns what it found so far.
    pub fn scan_paths(paths: &[PathBuf], cancel: &AtomicBool) -> Vec<PluginDescriptor> {
        let mut found = Vec::new();

        log::info!("Starting plugin scan ({} search path(s))", paths.len());
        if paths.is_empty() {
            log::warn!("No plugin search paths configured. Add paths or install plugins to ~/.clap");
        }

        for search_path in paths {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Plugin scan cancelled");
                break;
            }
            if let Err(e) = Self::scan_directory(search_path, cancel, &mut found) {
                log::warn!("Failed to scan plugin directory {:?}: {}", search_path, e);
            }
        }

        let available = found.iter().filter(|p| p.available).count();
        log::info!(
            "Plugin scan complete: {} plugin(s) found, {} available",
            found.len(),
            available
        );

        found
    }

    /// Scan a single directory for .clap bundles
    fn scan_directory(
        dir: &Path,
        cancel: &AtomicBool,
        found: &mut Vec<PluginDescriptor>,
    ) -> HostResult<()> {
        if !dir.exists() {
            return Ok(());
        }

        log::info!("Scanning plugin directory: {:?}", dir);

        for entry in std::fs::read_dir(dir)? {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            let entry = entry?;
            let path = entry.path();

            // Bundles are directories on some platforms, files on others;
            // the extension is the contract either way.
            if path.extension().map(|e| e == "clap").unwrap_or(false) {
                match Self::scan_bundle(&path) {
                    Ok(descriptors) => {
                        for descriptor in descriptors {
                            log::info!(
                                "Discovered plugin: {} ({}) from {:?}",
                                descriptor.name,
                                descriptor.id,
                                path
                            );
                            found.push(descriptor);
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to scan plugin bundle {:?}: {}", path, e);
                        found.push(PluginDescriptor::unavailable(path, e.to_string()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert a CStr to String, handling potential UTF-8 errors
    fn cstr_to_string(cstr: &std::ffi::CStr) -> String {
        cstr.to_str().unwrap_or("").to_string()
    }

    /// Scan a single .clap bundle for plugins
    ///
    /// A bundle can contain multiple plugins, so this returns a Vec.
    fn scan_bundle(bundle_path: &Path) -> HostResult<Vec<PluginDescriptor>> {
        use clack_host::bundle::PluginBundle;

        let bundle = unsafe {
            PluginBundle::load(bundle_path).map_err(|e| HostError::BundleLoadFailed {
                path: bundle_path.to_path_buf(),
                reason: format!("{:?}", e),
            })?
        };

        let factory = bundle.get_plugin_factory().ok_or_else(|| {
            HostError::BundleLoadFailed {
                path: bundle_path.to_path_buf(),
                reason: "No plugin factory found".to_string(),
            }
        })?;

        let mut descriptors = Vec::new();

        for descriptor in factory.plugin_descriptors() {
            let id = descriptor.id().map(Self::cstr_to_string).unwrap_or_default();
            let name = descriptor
                .name()
                .map(Self::cstr_to_string)
                .unwrap_or_else(|| id.clone());
            let vendor = descriptor.vendor().map(Self::cstr_to_string).unwrap_or_default();
            let version = descriptor.version().map(Self::cstr_to_string).unwrap_or_default();

            descriptors.push(PluginDescriptor {
                id,
                name,
                vendor,
                version,
                bundle_path: bundle_path.to_path_buf(),
                available: true,
                error_message: None,
            });
        }

        Ok(descriptors)
    }

    /// Get a descriptor by plugin id (available plugins only)
    pub fn descriptor(&self, plugin_id: &str) -> Option<&PluginDescriptor> {
        self.by_id.get(plugin_id)
    }

    /// Get all discovered descriptors (including unavailable)
    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Get only available (successfully enumerated) descriptors
    pub fn available_descriptors(&self) -> Vec<&PluginDescriptor> {
        self.descriptors.iter().filter(|p| p.available).collect()
    }

    /// Whether a scan has completed since the search paths last changed
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_paths_expand_home() {
        let paths = Discovery::default_search_paths();
        assert!(paths.iter().all(|p| !p.to_string_lossy().contains('~')));
    }

    #[test]
    fn test_unavailable_descriptor() {
        let descriptor = PluginDescriptor::unavailable(
            PathBuf::from("/usr/lib/clap/broken.clap"),
            "Load failed".to_string(),
        );
        assert!(!descriptor.available);
        assert!(descriptor.error_message.is_some());
        assert_eq!(descriptor.name, "broken");
    }

    #[test]
    fn test_replace_descriptors_sorts_and_indexes() {
        let mut discovery = Discovery::with_paths(vec![]);
        discovery.replace_descriptors(vec![
            PluginDescriptor {
                id: "b.plugin".into(),
                name: "Zeta".into(),
                vendor: String::new(),
                version: String::new(),
                bundle_path: PathBuf::new(),
                available: true,
                error_message: None,
            },
            PluginDescriptor {
                id: "a.plugin".into(),
                name: "Alpha".into(),
                vendor: String::new(),
                version: String::new(),
                bundle_path: PathBuf::new(),
                available: true,
                error_message: None,
            },
            PluginDescriptor::unavailable(PathBuf::from("/tmp/x.clap"), "nope".into()),
        ]);

        assert_eq!(discovery.descriptors().len(), 3);
        assert_eq!(discovery.descriptors()[0].name, "Alpha");
        assert!(discovery.descriptor("a.plugin").is_some());
        // Unavailable plugins are listed but not resolvable by id
        assert!(discovery.descriptor("unknown:x").is_none());
        assert_eq!(discovery.available_descriptors().len(), 2);
        assert!(discovery.is_scanned());
    }

    #[test]
    fn test_scan_missing_directory_is_skipped() {
        let paths = vec![PathBuf::from("/nonexistent/clap-dir")];
        let found = Discovery::scan_paths(&paths, &AtomicBool::new(false));
        assert!(found.is_empty());
    }

    #[test]
    fn test_cancelled_scan_stops_early() {
        let cancel = AtomicBool::new(true);
        let dir = tempfile::tempdir().unwrap();
        let found = Discovery::scan_paths(&[dir.path().to_path_buf()], &cancel);
        assert!(found.is_empty());
    }
}
