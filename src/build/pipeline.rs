//! Build pipeline: clean, then run asset tasks level by level.
//!
//! The pipeline executes a [`TaskGraph`]. Tasks in the same level run
//! concurrently on scoped worker threads; a level starts only after the
//! previous one finished, so clean always completes before any transform
//! writes output.

use crate::asset::AssetClass;
use crate::build::{
    discover_sources, BuildContext, BuildResult, GraphError, SourceFile, TaskGraph, TaskId,
    TaskResult,
};
use crate::transforms::{chain_for, output_path, Asset, Chain, TransformError};
use rayon::prelude::*;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Fatal build error. Per-file transform errors are not fatal and are
/// reported through [`TaskResult`] instead.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Output root could not be removed
    #[error("failed to clean {}: {source}", .path.display())]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Output root would delete the project or its sources
    #[error("refusing to clean {}: it contains the project sources", .0.display())]
    UnsafeClean(PathBuf),
    /// Task graph could not be ordered
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Build pipeline for executing builds.
pub struct BuildPipeline<'a> {
    context: &'a BuildContext,
    jobs: usize,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(context: &'a BuildContext) -> Self {
        Self { context, jobs: context.jobs() }
    }

    /// Set the number of parallel workers.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Clean, then run every asset task.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        self.run(&TaskGraph::build())
    }

    /// Delete the output root.
    pub fn clean(&self) -> Result<BuildResult, BuildError> {
        self.run(&TaskGraph::clean())
    }

    /// Execute a task graph.
    pub fn run(&self, graph: &TaskGraph) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let levels = graph.levels()?;

        tracing::debug!(
            tasks = graph.len(),
            levels = levels.len(),
            workers = self.jobs,
            "executing task graph"
        );

        let mut result = BuildResult::new();
        for level in levels {
            for task_result in self.execute_level(&level) {
                result.add_result(task_result?);
            }
        }

        Ok(result.with_duration(start.elapsed()))
    }

    /// Execute a single level of tasks in parallel.
    fn execute_level(&self, tasks: &[TaskId]) -> Vec<Result<TaskResult, BuildError>> {
        if self.jobs == 1 || tasks.len() <= 1 {
            return tasks.iter().map(|t| guarded(*t, || self.execute_task(*t))).collect();
        }

        let next_idx = AtomicUsize::new(0);
        let mut results: Vec<(usize, Result<TaskResult, BuildError>)> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..self.jobs.min(tasks.len()))
                .map(|_| {
                    let next_idx = &next_idx;
                    s.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                            if idx >= tasks.len() {
                                break;
                            }
                            let task = tasks[idx];
                            done.push((idx, guarded(task, || self.execute_task(task))));
                        }
                        done
                    })
                })
                .collect();

            workers
                .into_iter()
                .flat_map(|w| {
                    w.join().unwrap_or_else(|_| {
                        tracing::error!("build worker panicked");
                        Vec::new()
                    })
                })
                .collect()
        });

        // Keep graph order regardless of completion order
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    fn execute_task(&self, task: TaskId) -> Result<TaskResult, BuildError> {
        match task {
            TaskId::Clean => clean_output(self.context),
            TaskId::Transform(class) => Ok(run_task(self.context, class)),
        }
    }
}

/// Run a task, recording a panic as a failed result for that task.
fn guarded(
    task: TaskId,
    run: impl FnOnce() -> Result<TaskResult, BuildError>,
) -> Result<TaskResult, BuildError> {
    let start = Instant::now();
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        let message = format!("task panicked: {}", panic_message(payload.as_ref()));
        tracing::error!(task = %task, "{}", message);
        Ok(TaskResult::failed(task, message, start.elapsed()))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Remove the output root. A missing root is not an error.
pub fn clean_output(ctx: &BuildContext) -> Result<TaskResult, BuildError> {
    let start = Instant::now();
    let out_dir = ctx.out_dir();

    if ctx.project_root().starts_with(&out_dir) || ctx.src_dir().starts_with(&out_dir) {
        return Err(BuildError::UnsafeClean(out_dir));
    }

    match fs::remove_dir_all(&out_dir) {
        Ok(()) => tracing::info!(task = "clean", path = %out_dir.display(), "removed output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(task = "clean", path = %out_dir.display(), "nothing to clean")
        }
        Err(source) => return Err(BuildError::Clean { path: out_dir, source }),
    }

    Ok(TaskResult::completed(TaskId::Clean, vec![], vec![], start.elapsed()))
}

/// Run the transform task of one asset class.
///
/// Every matching source file goes through the class's transform chain and
/// is written under the class destination. A file that fails is logged and
/// skipped; the task still completes. Reload-relevant classes notify the
/// reload signal when they wrote anything.
pub fn run_task(ctx: &BuildContext, class: AssetClass) -> TaskResult {
    let start = Instant::now();
    let task = TaskId::Transform(class);
    tracing::info!(task = %class, "starting");

    let chain = match chain_for(class, ctx) {
        Ok(chain) => chain,
        Err(e) => {
            tracing::error!(task = %class, "{}", e);
            return TaskResult::failed(task, e, start.elapsed());
        }
    };

    let sources = match discover_sources(ctx, class) {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!(task = %class, "{}", e);
            return TaskResult::failed(task, e.to_string(), start.elapsed());
        }
    };

    let dest = ctx.dest_dir(class);
    let outcomes: Vec<Result<PathBuf, TransformError>> = if class == AssetClass::Images {
        sources.par_iter().map(|s| process_file(&chain, &dest, s)).collect()
    } else {
        sources.iter().map(|s| process_file(&chain, &dest, s)).collect()
    };

    let mut outputs = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(path) => outputs.push(path),
            Err(e) => {
                tracing::error!(task = %class, "{}", e);
                errors.push(e);
            }
        }
    }

    if class.reloads() && !outputs.is_empty() {
        let served = ctx.serve_dir();
        let paths = outputs.iter().map(|p| served_path(&served, p)).collect();
        ctx.reload().notify(class, paths);
    }

    let duration = start.elapsed();
    tracing::info!(
        task = %class,
        files = outputs.len(),
        errors = errors.len(),
        "finished in {:?}",
        duration
    );

    TaskResult::completed(task, outputs, errors, duration)
}

fn process_file(
    chain: &Chain,
    dest: &Path,
    source: &SourceFile,
) -> Result<PathBuf, TransformError> {
    let class = chain.class();
    let fail = |message: String| TransformError::new(class, &source.path, message);

    let contents = fs::read(&source.path).map_err(|e| fail(format!("read failed: {}", e)))?;
    let asset = chain.run(Asset::new(source.path.clone(), source.relative.clone(), contents))?;
    let output = output_path(dest, &asset);

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| fail(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    fs::write(&output, &asset.contents)
        .map_err(|e| fail(format!("failed to write {}: {}", output.display(), e)))?;

    tracing::debug!(task = %class, output = %output.display(), "wrote");
    Ok(output)
}

/// Path of an output as seen from the served root.
fn served_path(served: &Path, output: &Path) -> PathBuf {
    output.strip_prefix(served).map(Path::to_path_buf).unwrap_or_else(|_| output.to_path_buf())
}
