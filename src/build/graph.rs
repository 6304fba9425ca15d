//! Task dependency graph.
//!
//! A build is a small DAG: `clean` first, then one transform task per asset
//! class. The graph is grouped into levels where every dependency of a task
//! sits in an earlier level; the tasks of one level can run concurrently.

use crate::asset::AssetClass;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// A node of the build graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Delete the output root
    Clean,
    /// Run the transform task of one asset class
    Transform(AssetClass),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Clean => f.write_str("clean"),
            TaskId::Transform(class) => f.write_str(class.name()),
        }
    }
}

/// Error building or ordering the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A task depends on a task that is not in the graph
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },
    /// Dependencies form a cycle
    #[error("circular dependency among tasks: {}", format_ids(.0))]
    Cycle(Vec<TaskId>),
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// Task with its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub id: TaskId,
    pub dependencies: Vec<TaskId>,
}

/// Explicit task graph executed level by level.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full build: clean, then every transform task.
    pub fn build() -> Self {
        let mut graph = Self::new();
        graph.add(TaskId::Clean, vec![]);
        for class in AssetClass::ALL {
            graph.add(TaskId::Transform(class), vec![TaskId::Clean]);
        }
        graph
    }

    /// A single transform task with no clean, as run by the watcher.
    pub fn single(class: AssetClass) -> Self {
        let mut graph = Self::new();
        graph.add(TaskId::Transform(class), vec![]);
        graph
    }

    /// Only the clean task.
    pub fn clean() -> Self {
        let mut graph = Self::new();
        graph.add(TaskId::Clean, vec![]);
        graph
    }

    /// Add a task. Adding an existing id replaces its dependencies.
    pub fn add(&mut self, id: TaskId, dependencies: Vec<TaskId>) {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => node.dependencies = dependencies,
            None => self.nodes.push(TaskNode { id, dependencies }),
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Group tasks into dependency levels.
    ///
    /// Each inner vector holds tasks whose dependencies are all in earlier
    /// levels, in insertion order.
    pub fn levels(&self) -> Result<Vec<Vec<TaskId>>, GraphError> {
        let known: HashSet<TaskId> = self.tasks().collect();
        for node in &self.nodes {
            if let Some(&dependency) = node.dependencies.iter().find(|d| !known.contains(d)) {
                return Err(GraphError::UnknownDependency { task: node.id, dependency });
            }
        }

        let mut level_of: HashMap<TaskId, usize> = HashMap::new();
        let mut remaining: Vec<&TaskNode> = self.nodes.iter().collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&TaskNode>, Vec<&TaskNode>) = remaining
                .into_iter()
                .partition(|n| n.dependencies.iter().all(|d| level_of.contains_key(d)));

            if ready.is_empty() {
                return Err(GraphError::Cycle(blocked.iter().map(|n| n.id).collect()));
            }

            let current = levels.len();
            for node in &ready {
                level_of.insert(node.id, current);
            }
            levels.push(ready.iter().map(|n| n.id).collect());
            remaining = blocked;
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_graph_levels() {
        let levels = TaskGraph::build().levels().unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], vec![TaskId::Clean]);
        assert_eq!(levels[1].len(), 5);
        assert!(levels[1].contains(&TaskId::Transform(AssetClass::Fonts)));
    }

    #[test]
    fn test_single_graph() {
        let levels = TaskGraph::single(AssetClass::Styles).levels().unwrap();
        assert_eq!(levels, vec![vec![TaskId::Transform(AssetClass::Styles)]]);
    }

    #[test]
    fn test_empty_graph() {
        assert!(TaskGraph::new().levels().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = TaskGraph::new();
        graph.add(TaskId::Transform(AssetClass::Fonts), vec![TaskId::Clean]);
        let err = graph.levels().unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                task: TaskId::Transform(AssetClass::Fonts),
                dependency: TaskId::Clean
            }
        );
    }

    #[test]
    fn test_cycle_detected() {
        let styles = TaskId::Transform(AssetClass::Styles);
        let scripts = TaskId::Transform(AssetClass::Scripts);
        let mut graph = TaskGraph::new();
        graph.add(TaskId::Clean, vec![]);
        graph.add(styles, vec![scripts]);
        graph.add(scripts, vec![styles]);

        match graph.levels() {
            Err(GraphError::Cycle(ids)) => assert_eq!(ids, vec![styles, scripts]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId::Clean.to_string(), "clean");
        assert_eq!(TaskId::Transform(AssetClass::Images).to_string(), "images");
    }
}
