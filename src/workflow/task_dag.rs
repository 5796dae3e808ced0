//! # Task DAG
//!
//! Arena of workflow tasks addressed by [`TaskId`]. Each task keeps explicit
//! `inputs`/`outputs` edge lists (the DAG) and a `parent`/`children` tree view
//! derived from its first input.
//!
//! ## Key Features
//!
//! - **Synthetic anchors**: every DAG starts with a Root task feeding a Start task
//! - **Non-destructive waits**: [`TaskDag::wait_for`] inserts Merge nodes without
//!   touching unrelated edges
//! - **Validation**: cycle detection over the edge lists
//!
//! ```rust
//! use deployer_core::workflow::{TaskCall, TaskDag, TaskProperties};
//!
//! let mut dag = TaskDag::new();
//! let a = dag.add_call("A", TaskCall::new("nova", "a"), TaskProperties::new());
//! let b = dag.add_call("B", TaskCall::new("nova", "b"), TaskProperties::new());
//! dag.connect(dag.start(), a).unwrap();
//!
//! assert_eq!(dag.wait_for(b, &[]).unwrap(), b);
//! dag.wait_for(b, &[a]).unwrap();
//! assert_eq!(dag.get(b).unwrap().inputs, vec![a]);
//! ```

use super::task::{Task, TaskCall, TaskId, TaskKind, TaskProperties, TaskTag};
use crate::error::{DeployerError, Result};
use crate::state_machine::TaskState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

const ROOT: TaskId = TaskId(0);
const START: TaskId = TaskId(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDag {
    tasks: Vec<Task>,
}

impl Default for TaskDag {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDag {
    /// Create a DAG containing only the Root→Start anchors
    pub fn new() -> Self {
        let mut dag = Self { tasks: Vec::new() };
        dag.add_task("Root", TaskKind::Root, TaskProperties::new());
        dag.add_task("Start", TaskKind::Start, TaskProperties::new());
        dag.link(ROOT, START);
        dag
    }

    pub fn root(&self) -> TaskId {
        ROOT
    }

    pub fn start(&self) -> TaskId {
        START
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }

    pub fn get(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .get(id.0)
            .ok_or_else(|| DeployerError::not_found("task", id.to_string()))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .get_mut(id.0)
            .ok_or_else(|| DeployerError::not_found("task", id.to_string()))
    }

    pub fn add_task(
        &mut self,
        name: impl Into<String>,
        kind: TaskKind,
        properties: TaskProperties,
    ) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(id, name.into(), kind, properties));
        id
    }

    pub fn add_call(
        &mut self,
        name: impl Into<String>,
        call: TaskCall,
        properties: TaskProperties,
    ) -> TaskId {
        self.add_task(name, TaskKind::Call(call), properties)
    }

    pub fn add_merge(&mut self, name: impl Into<String>) -> TaskId {
        self.add_task(
            name,
            TaskKind::Merge,
            TaskProperties::new().tagged(&[TaskTag::Wait]),
        )
    }

    /// Add an edge `from → to`. Connecting an existing edge is a no-op.
    pub fn connect(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        self.get(from)?;
        self.get(to)?;
        if from == to {
            return Err(DeployerError::validation(format!(
                "Task {from} cannot wait on itself"
            )));
        }
        if to == ROOT {
            return Err(DeployerError::validation("Root task cannot have inputs"));
        }
        if self.tasks[to.0].inputs.contains(&from) {
            return Ok(());
        }
        self.link(from, to);
        Ok(())
    }

    fn link(&mut self, from: TaskId, to: TaskId) {
        self.tasks[from.0].outputs.push(to);
        self.tasks[to.0].inputs.push(from);
        if self.tasks[to.0].parent.is_none() {
            self.tasks[to.0].parent = Some(from);
            self.tasks[from.0].children.push(to);
        }
    }

    /// Remove the edge `from → to`, re-parenting `to` onto its next input
    pub fn disconnect(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        self.get(from)?;
        self.get(to)?;
        self.tasks[from.0].outputs.retain(|id| *id != to);
        self.tasks[to.0].inputs.retain(|id| *id != from);
        if self.tasks[to.0].parent == Some(from) {
            self.tasks[from.0].children.retain(|id| *id != to);
            let next = self.tasks[to.0].inputs.first().copied();
            self.tasks[to.0].parent = next;
            if let Some(parent) = next.and_then(|p| self.tasks.get_mut(p.0)) {
                parent.children.push(to);
            }
        }
        Ok(())
    }

    /// Wire `task` so it only becomes READY once every task in `wait_list`
    /// has completed. Returns `task`.
    ///
    /// A Merge task gains the missing inputs directly. Otherwise, when the
    /// combined predecessor set (existing inputs plus `wait_list`) has more
    /// than one member, a new Merge node is inserted in front of `task` and the
    /// existing inputs are rewired to it. A single predecessor is connected
    /// directly.
    pub fn wait_for(&mut self, task: TaskId, wait_list: &[TaskId]) -> Result<TaskId> {
        self.get(task)?;
        let mut wait_set: Vec<TaskId> = Vec::with_capacity(wait_list.len());
        for id in wait_list {
            self.get(*id)?;
            if *id == task {
                return Err(DeployerError::validation(format!(
                    "Task {task} cannot wait on itself"
                )));
            }
            if !wait_set.contains(id) {
                wait_set.push(*id);
            }
        }
        if wait_set.is_empty() {
            return Ok(task);
        }

        if matches!(self.tasks[task.0].kind, TaskKind::Merge) {
            for id in wait_set {
                self.connect(id, task)?;
            }
            return Ok(task);
        }

        let existing = self.tasks[task.0].inputs.clone();
        let mut predecessors = existing.clone();
        for id in wait_set {
            if !predecessors.contains(&id) {
                predecessors.push(id);
            }
        }
        if predecessors.len() == existing.len() {
            return Ok(task);
        }
        if predecessors.len() == 1 {
            self.connect(predecessors[0], task)?;
            return Ok(task);
        }

        let names: Vec<&str> = predecessors
            .iter()
            .filter_map(|id| self.tasks.get(id.0))
            .map(|t| t.name.as_str())
            .collect();
        let merge_name = format!("{} Wait on ({})", self.tasks[task.0].name, names.join(", "));
        let merge = self.add_merge(merge_name);
        self.tasks[merge.0].properties.resource = self.tasks[task.0].properties.resource.clone();

        for id in &existing {
            self.disconnect(*id, task)?;
        }
        for id in &predecessors {
            self.connect(*id, merge)?;
        }
        self.connect(merge, task)?;
        Ok(task)
    }

    /// Tasks matching an optional resource key and an optional tag
    pub fn find_tasks(&self, resource: Option<&str>, tag: Option<TaskTag>) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| resource.map_or(true, |r| t.properties.resource.as_deref() == Some(r)))
            .filter(|t| tag.map_or(true, |tag| t.has_tag(tag)))
            .map(|t| t.id)
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// Every task reachable from `id` through outputs, excluding `id`
    pub fn reachable_from(&self, id: TaskId) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        if let Some(task) = self.tasks.get(id.0) {
            queue.extend(task.outputs.iter().copied());
        }
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(task) = self.tasks.get(next.0) {
                queue.extend(task.outputs.iter().copied());
            }
        }
        seen
    }

    /// Whether every input of `id` has completed
    pub fn inputs_satisfied(&self, id: TaskId) -> bool {
        self.tasks.get(id.0).map_or(false, |task| {
            task.inputs
                .iter()
                .all(|input| {
                    self.tasks
                        .get(input.0)
                        .map_or(false, |t| t.state.satisfies_dependencies())
                })
        })
    }

    pub fn count_in_state(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }

    /// Check the edge lists form a DAG and the tree view is consistent
    pub fn validate(&self) -> Result<()> {
        for task in &self.tasks {
            if task.parent != task.inputs.first().copied() {
                return Err(DeployerError::Internal(format!(
                    "Task {} ('{}') parent does not match its first input",
                    task.id, task.name
                )));
            }
            if let Some(input) = task.inputs.iter().find(|i| i.0 >= self.tasks.len()) {
                return Err(DeployerError::Internal(format!(
                    "Task {} ('{}') has unknown input {}",
                    task.id, task.name, input
                )));
            }
            for output in &task.outputs {
                let linked = self
                    .tasks
                    .get(output.0)
                    .map_or(false, |o| o.inputs.contains(&task.id));
                if !linked {
                    return Err(DeployerError::Internal(format!(
                        "Edge {} -> {} is not mirrored",
                        task.id, output
                    )));
                }
            }
        }

        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.inputs.len()).collect();
        let mut queue: VecDeque<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.inputs.is_empty())
            .map(|t| t.id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            let Some(task) = self.tasks.get(id.0) else {
                continue;
            };
            for output in &task.outputs {
                in_degree[output.0] -= 1;
                if in_degree[output.0] == 0 {
                    queue.push_back(*output);
                }
            }
        }
        if visited != self.tasks.len() {
            let cycle: Vec<String> = self
                .tasks
                .iter()
                .filter(|t| in_degree[t.id.0] > 0)
                .map(|t| t.name.clone())
                .collect();
            return Err(DeployerError::CircularDependency { cycle });
        }
        Ok(())
    }
}
