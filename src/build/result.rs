//! Build result types.
//!
//! Every task reports a [`TaskResult`] with a uniform [`TaskStatus`]; a build
//! collects them into a [`BuildResult`].

use crate::build::TaskId;
use crate::transforms::TransformError;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Every file was processed
    Success,
    /// The task completed, but some files failed and were skipped
    Recovered(Vec<TransformError>),
    /// The task could not run at all
    Failed(String),
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, TaskStatus::Recovered(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Recovered(errors) => write!(f, "recovered from {} error(s)", errors.len()),
            TaskStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: TaskId,
    pub status: TaskStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    pub duration: Duration,
}

impl TaskResult {
    /// Build a result from the outputs and the errors collected while running.
    pub fn completed(
        task: TaskId,
        outputs: Vec<PathBuf>,
        errors: Vec<TransformError>,
        duration: Duration,
    ) -> Self {
        let status =
            if errors.is_empty() { TaskStatus::Success } else { TaskStatus::Recovered(errors) };
        Self { task, status, outputs, duration }
    }

    pub fn failed(task: TaskId, error: String, duration: Duration) -> Self {
        Self { task, status: TaskStatus::Failed(error), outputs: vec![], duration }
    }

    /// Errors the task recovered from.
    pub fn errors(&self) -> &[TransformError] {
        match &self.status {
            TaskStatus::Recovered(errors) => errors,
            _ => &[],
        }
    }
}

/// Result of a complete build run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results in graph order
    pub tasks: Vec<TaskResult>,
    pub total_duration: Duration,
}

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Look up the result of a task.
    pub fn get(&self, task: TaskId) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == task)
    }

    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn recovered_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_recovered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Whether the build counts as successful.
    ///
    /// Failed tasks always fail the build; recovered tasks only in strict mode.
    pub fn is_success(&self, strict: bool) -> bool {
        self.failed_count() == 0 && (!strict || self.recovered_count() == 0)
    }

    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    pub fn all_errors(&self) -> Vec<&TransformError> {
        self.tasks.iter().flat_map(|r| r.errors().iter()).collect()
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        let outputs = self.all_outputs().len();
        let total = self.tasks.len();

        if self.failed_count() > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} recovered, {} failed ({} total)",
                self.success_count(),
                self.recovered_count(),
                self.failed_count(),
                total
            ));
            for task in self.tasks.iter().filter(|r| r.status.is_failure()) {
                lines.push(format!("  - {}: {}", task.task, task.status));
            }
        } else {
            lines.push(format!(
                "Build finished: {} tasks, {} files written in {:?}",
                total, outputs, self.total_duration
            ));
        }

        let errors = self.all_errors();
        if !errors.is_empty() {
            lines.push(format!("Errors ({}):", errors.len()));
            for error in errors.iter().take(5) {
                lines.push(format!("  - {}", error));
            }
            if errors.len() > 5 {
                lines.push(format!("  ... and {} more", errors.len() - 5));
            }
        }

        lines.join("\n")
    }
}
