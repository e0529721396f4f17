// Step Dependency Graph
// Orders the steps that must run before a target step

use crate::model::{Job, StepDefinition};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Error type for dependency resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyError {
    pub message: String,
    pub kind: DependencyErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyErrorKind {
    /// Circular dependency between steps
    CyclicDependency,
    /// A step depends on a name that is not in the job
    UnresolvedDependency,
    /// The requested target step does not exist
    UnknownStep,
    /// A step with step environments would share a session with other steps
    SeparateSessionRequired,
    /// Duplicate step names
    InvalidStructure,
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency error: {}", self.message)
    }
}

impl std::error::Error for DependencyError {}

impl DependencyError {
    fn new(kind: DependencyErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn cyclic(message: impl Into<String>) -> Self {
        Self::new(DependencyErrorKind::CyclicDependency, message)
    }

    pub fn unresolved(message: impl Into<String>) -> Self {
        Self::new(DependencyErrorKind::UnresolvedDependency, message)
    }

    pub fn unknown_step(message: impl Into<String>) -> Self {
        Self::new(DependencyErrorKind::UnknownStep, message)
    }

    pub fn separate_session(message: impl Into<String>) -> Self {
        Self::new(DependencyErrorKind::SeparateSessionRequired, message)
    }

    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::new(DependencyErrorKind::InvalidStructure, message)
    }
}

/// Directed graph over the steps of a job, keyed by dependency declarations
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
    job_name: &'a str,
    /// Steps in declaration order
    steps: Vec<&'a StepDefinition>,
    /// Quick lookup of step index by name
    indices: HashMap<&'a str, usize>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, rejecting duplicate step names
    pub fn from_job(job: &'a Job) -> Result<Self, DependencyError> {
        let mut indices = HashMap::with_capacity(job.steps.len());

        for (i, step) in job.steps.iter().enumerate() {
            if indices.insert(step.name.as_str(), i).is_some() {
                return Err(DependencyError::invalid_structure(format!(
                    "Job '{}' declares more than one Step named '{}'",
                    job.name, step.name
                )));
            }
        }

        Ok(Self {
            job_name: &job.name,
            steps: job.steps.iter().collect(),
            indices,
        })
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&'a StepDefinition> {
        self.indices.get(name).map(|&i| self.steps[i])
    }

    /// Steps to run for `target`, dependencies first.
    ///
    /// Without `include_dependencies` this is just the target. Otherwise it is the
    /// subgraph reachable from the target in topological order, with ties broken by
    /// declaration order.
    pub fn resolve_order(
        &self,
        target: &str,
        include_dependencies: bool,
    ) -> Result<Vec<&'a StepDefinition>, DependencyError> {
        let target_index = *self.indices.get(target).ok_or_else(|| {
            DependencyError::unknown_step(format!(
                "Step '{}' does not exist in Job '{}'",
                target, self.job_name
            ))
        })?;

        if !include_dependencies {
            return Ok(vec![self.steps[target_index]]);
        }

        let reachable = self.reachable_from(target_index)?;
        self.detect_cycles(target_index)?;
        let order = self.topological_order(&reachable);

        if order.len() > 1 {
            if let Some(step) = order.iter().find(|s| !s.step_environments.is_empty()) {
                return Err(DependencyError::separate_session(format!(
                    "Step '{}' declares Step Environments and cannot be run in the same local Session as other Steps",
                    step.name
                )));
            }
        }

        tracing::debug!(
            step = target,
            steps = ?order.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "resolved step order"
        );
        Ok(order)
    }

    /// Indices of every step reachable from `start`, checking that each dependency exists
    fn reachable_from(&self, start: usize) -> Result<BTreeSet<usize>, DependencyError> {
        let mut reachable = BTreeSet::new();
        let mut pending = vec![start];

        while let Some(index) = pending.pop() {
            if !reachable.insert(index) {
                continue;
            }
            let step = self.steps[index];
            for dep in step.dependency_names() {
                let dep_index = self.indices.get(dep).ok_or_else(|| {
                    DependencyError::unresolved(format!(
                        "Step '{}' depends on '{}', which does not exist in Job '{}'",
                        step.name, dep, self.job_name
                    ))
                })?;
                pending.push(*dep_index);
            }
        }

        Ok(reachable)
    }

    /// Detect cycles in the reachable subgraph using DFS
    fn detect_cycles(&self, start: usize) -> Result<(), DependencyError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        if let Some(path) = self.dfs_cycle(start, &mut visited, &mut rec_stack) {
            let last = path.last().copied().unwrap_or_default();
            let first = path.iter().position(|name| *name == last).unwrap_or(0);
            return Err(DependencyError::cyclic(format!(
                "dependency cycle detected between Steps: {}",
                path[first..].join(" -> ")
            )));
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        index: usize,
        visited: &mut HashSet<usize>,
        rec_stack: &mut HashSet<usize>,
    ) -> Option<Vec<&'a str>> {
        let step = self.steps[index];
        visited.insert(index);
        rec_stack.insert(index);

        for dep in step.dependency_names() {
            let Some(&dep_index) = self.indices.get(dep) else {
                continue;
            };
            if !visited.contains(&dep_index) {
                if let Some(mut cycle) = self.dfs_cycle(dep_index, visited, rec_stack) {
                    cycle.insert(0, step.name.as_str());
                    return Some(cycle);
                }
            } else if rec_stack.contains(&dep_index) {
                return Some(vec![step.name.as_str(), self.steps[dep_index].name.as_str()]);
            }
        }

        rec_stack.remove(&index);
        None
    }

    /// Kahn's algorithm over the reachable steps; the ready set is ordered by declaration
    fn topological_order(&self, reachable: &BTreeSet<usize>) -> Vec<&'a StepDefinition> {
        let mut in_degree: HashMap<usize, usize> = HashMap::new();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

        for &index in reachable {
            let mut degree = 0;
            for dep in self.steps[index].dependency_names() {
                if let Some(&dep_index) = self.indices.get(dep) {
                    dependents.entry(dep_index).or_default().push(index);
                    degree += 1;
                }
            }
            in_degree.insert(index, degree);
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&index, _)| index)
            .collect();

        let mut result = Vec::with_capacity(reachable.len());

        while let Some(index) = ready.pop_first() {
            result.push(self.steps[index]);

            if let Some(neighbors) = dependents.get(&index) {
                for neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*neighbor);
                        }
                    }
                }
            }
        }

        result
    }
}
