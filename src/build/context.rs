//! Build context containing configuration and shared state for a build.

use crate::asset::AssetClass;
use crate::config::PipelineConfig;
use crate::reload::ReloadSignal;
use std::path::{Path, PathBuf};

/// Build context containing configuration, paths, and the reload signal.
///
/// The context is created once per process and handed by reference to every
/// task. Tasks never mutate it.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: PipelineConfig,
    /// Project root directory (where frontpipe.toml is located)
    project_root: PathBuf,
    /// Live-reload broadcaster shared with the dev server
    reload: ReloadSignal,
}

impl BuildContext {
    /// Create a new build context with its own reload signal.
    pub fn new(config: PipelineConfig, project_root: PathBuf) -> Self {
        Self { config, project_root, reload: ReloadSignal::new() }
    }

    /// Use an existing reload signal, e.g. one the dev server already holds.
    pub fn with_reload(mut self, reload: ReloadSignal) -> Self {
        self.reload = reload;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn reload(&self) -> &ReloadSignal {
        &self.reload
    }

    /// Source root (resolved to absolute path), observed by the watcher.
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Output root (resolved to absolute path), deleted by clean.
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Destination directory for an asset class.
    pub fn dest_dir(&self, class: AssetClass) -> PathBuf {
        self.resolve_path(&self.config.assets.get(class).dest)
    }

    /// Directory served by the dev server.
    pub fn serve_dir(&self) -> PathBuf {
        match &self.config.server.base_dir {
            Some(dir) => self.resolve_path(dir),
            None => self.out_dir(),
        }
    }

    /// Image optimizer cache directory, or `None` when caching is disabled.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.config.images.cache.then(|| self.resolve_path(&self.config.images.cache_dir))
    }

    /// Whether recovered transform errors fail the build.
    pub fn is_strict(&self) -> bool {
        self.config.build.strict
    }

    /// Maximum number of concurrently running tasks.
    pub fn jobs(&self) -> usize {
        self.config.build.jobs.max(1)
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}
