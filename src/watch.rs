//! Watch mode for automatic rebuilds on file changes
//!
//! One debounced observer covers the source root. Each batch of changed
//! paths is matched against every asset class's watch patterns, and only the
//! matching classes' tasks re-run. Unrelated outputs are left untouched.

use crate::asset::AssetClass;
use crate::build::{
    compile_patterns, matches_any, relative_to_root, BuildContext, BuildPipeline, DiscoveryError,
    TaskGraph, TaskId,
};
use glob::Pattern;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

/// How often the loop checks the stop flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("failed to watch {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    /// Event channel closed
    #[error("watch channel closed")]
    ChannelClosed,
    /// Source directory not found
    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// Invalid watch pattern
    #[error(transparent)]
    Pattern(#[from] DiscoveryError),
}

/// Maps changed paths to the asset classes whose watch patterns match them.
#[derive(Debug)]
pub struct WatchRouter {
    root: PathBuf,
    /// Resolved root; observers may report paths through symlinks resolved
    canonical_root: Option<PathBuf>,
    classes: Vec<(AssetClass, Vec<Pattern>)>,
}

impl WatchRouter {
    pub fn new(ctx: &BuildContext) -> Result<Self, DiscoveryError> {
        let classes = AssetClass::ALL
            .iter()
            .map(|&class| -> Result<_, DiscoveryError> {
                let patterns = ctx.config().assets.get(class).watch_patterns();
                Ok((class, compile_patterns(patterns)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let root = ctx.project_root().to_path_buf();
        let canonical_root = root.canonicalize().ok().filter(|c| *c != root);
        Ok(Self { root, canonical_root, classes })
    }

    /// Classes affected by a change to `path`.
    pub fn classes_for(&self, path: &Path) -> Vec<AssetClass> {
        let relative = relative_to_root(&self.root, path).or_else(|| {
            self.canonical_root.as_ref().and_then(|root| relative_to_root(root, path))
        });
        let Some(relative) = relative else {
            return vec![];
        };
        self.classes
            .iter()
            .filter(|(_, patterns)| matches_any(patterns, &relative))
            .map(|(class, _)| *class)
            .collect()
    }

    /// Classes affected by a batch of changes, each listed once.
    pub fn classes_for_all<'p>(
        &self,
        paths: impl IntoIterator<Item = &'p Path>,
    ) -> BTreeSet<AssetClass> {
        paths.into_iter().flat_map(|p| self.classes_for(p)).collect()
    }
}

/// Re-run the tasks of the given classes concurrently, without cleaning.
pub fn rerun(ctx: &BuildContext, classes: &BTreeSet<AssetClass>) {
    let mut graph = TaskGraph::new();
    for &class in classes {
        graph.add(TaskId::Transform(class), vec![]);
    }

    match BuildPipeline::new(ctx).run(&graph) {
        Ok(result) => {
            for task in result.tasks.iter().filter(|t| !t.status.is_success()) {
                tracing::warn!(task = %task.task, "{}", task.status);
            }
        }
        Err(e) => tracing::error!("rebuild failed: {}", e),
    }
}

/// Watch the source root and re-run affected tasks until `stop` is set.
///
/// Blocks the calling thread. Errors reported by the observer are logged and
/// watching continues.
pub fn watch(ctx: &BuildContext, stop: &AtomicBool) -> Result<(), WatchError> {
    let src_dir = ctx.src_dir();
    if !src_dir.exists() {
        return Err(WatchError::SourceNotFound(src_dir));
    }

    let router = WatchRouter::new(ctx)?;

    let (tx, rx) = channel();
    let debounce = Duration::from_millis(u64::from(ctx.config().watch.debounce_ms));
    let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;
    debouncer
        .watcher()
        .watch(&src_dir, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath { path: src_dir.clone(), source })?;

    tracing::info!(path = %src_dir.display(), "watching for changes");

    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => {
                let changed: Vec<&Path> = events
                    .iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path.as_path())
                    .collect();
                for path in &changed {
                    tracing::debug!(path = %path.display(), "changed");
                }

                let classes = router.classes_for_all(changed);
                if !classes.is_empty() {
                    let names: Vec<_> = classes.iter().map(|c| c.name()).collect();
                    tracing::info!(tasks = ?names, "source changed, rebuilding");
                    rerun(ctx, &classes);
                }
            }
            Ok(Err(error)) => {
                // Observer errors are not fatal
                tracing::warn!("watch error: {:?}", error);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
        }
    }

    tracing::info!("stopped watching");
    Ok(())
}
