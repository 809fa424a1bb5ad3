//! Dependency graph between pipeline units.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::validation::ValidationErrors;

/// Whether a unit produces an image or deploys something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum UnitKind {
    #[display("artifact")]
    Artifact,
    #[display("application")]
    Application,
}

impl UnitKind {
    fn job_prefix(self) -> &'static str {
        match self {
            UnitKind::Artifact => "build",
            UnitKind::Application => "deploy",
        }
    }
}

/// A single unit in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: String,
    pub path: String,
    pub kind: UnitKind,
    pub upstreams: Vec<String>,
}

impl DependencyNode {
    pub fn artifact(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind: UnitKind::Artifact,
            upstreams: Vec::new(),
        }
    }

    pub fn application(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind: UnitKind::Application,
            upstreams: Vec::new(),
        }
    }

    /// Return a copy that also depends on `upstreams`.
    pub fn depends_on<I, S>(mut self, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstreams.extend(upstreams.into_iter().map(Into::into));
        self
    }
}

/// Units keyed by id, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a graph with `node` added. A repeated id is remembered and
    /// reported by [`DependencyGraph::validate`]; the first declaration wins.
    pub fn add(mut self, node: DependencyNode) -> Self {
        if self.index.contains_key(&node.id) {
            self.duplicates.push(node.id);
            return self;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        self
    }

    pub fn get(&self, id: &str) -> Option<&DependencyNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter()
    }

    /// `build-<id>` for artifacts, `deploy-<id>` for applications, empty if unknown.
    pub fn job_id(&self, id: &str) -> String {
        self.get(id)
            .map(|node| format!("{}-{}", node.kind.job_prefix(), node.id))
            .unwrap_or_default()
    }

    /// Job ids of the direct upstreams of `id`, in declaration order.
    pub fn upstream_job_ids(&self, id: &str) -> Vec<String> {
        self.get(id)
            .map(|node| {
                node.upstreams
                    .iter()
                    .map(|upstream| self.job_id(upstream))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deduplicated paths of `id` and everything reachable upstream of it,
    /// depth-first, first occurrence wins.
    pub fn all_paths(&self, id: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut seen_paths = HashSet::new();
        let mut paths = Vec::new();
        self.collect_paths(id, &mut visited, &mut seen_paths, &mut paths);
        paths
    }

    fn collect_paths<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        seen_paths: &mut HashSet<&'a str>,
        paths: &mut Vec<String>,
    ) {
        // Already-visited units are skipped, so a cycle cannot recurse forever.
        if !visited.insert(id) {
            return;
        }
        let Some(node) = self.get(id) else {
            return;
        };
        if seen_paths.insert(node.path.as_str()) {
            paths.push(node.path.clone());
        }
        for upstream in &node.upstreams {
            self.collect_paths(upstream, visited, seen_paths, paths);
        }
    }

    /// Check ids are unique, every upstream exists, artifacts only depend on
    /// artifacts, and there are no cycles. Unit errors are keyed by id; a
    /// cycle goes in the `cycles` child, keyed by the unit it starts from.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new("dependencies");

        for id in &self.duplicates {
            errors = errors.put(id.clone(), "duplicate unit id");
        }

        for node in &self.nodes {
            for upstream in &node.upstreams {
                match self.get(upstream) {
                    None => {
                        errors = errors.put(
                            node.id.clone(),
                            format!("depends on unknown unit '{}'", upstream),
                        );
                    }
                    Some(up)
                        if node.kind == UnitKind::Artifact
                            && up.kind == UnitKind::Application =>
                    {
                        errors = errors.put(
                            node.id.clone(),
                            format!("artifact cannot depend on application '{}'", upstream),
                        );
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            let start = cycle.split(" -> ").next().unwrap_or_default().to_string();
            errors = errors.put_child(ValidationErrors::new("cycles").put(start, cycle));
        }

        errors
    }

    /// Find a dependency cycle using DFS, returning its edges rendered as
    /// `a -> b -> a`.
    pub fn detect_cycle(&self) -> Option<String> {
        let mut state: BTreeMap<&str, VisitState> = BTreeMap::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            if !state.contains_key(node.id.as_str()) {
                if let Some(cycle) = self.dfs_detect_cycle(&node.id, &mut state, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_detect_cycle<'a>(
        &'a self,
        id: &'a str,
        state: &mut BTreeMap<&'a str, VisitState>,
        stack: &mut Vec<&'a str>,
    ) -> Option<String> {
        state.insert(id, VisitState::InProgress);
        stack.push(id);

        if let Some(node) = self.get(id) {
            for upstream in &node.upstreams {
                let upstream = upstream.as_str();
                match state.get(upstream) {
                    None => {
                        if let Some(cycle) = self.dfs_detect_cycle(upstream, state, stack) {
                            return Some(cycle);
                        }
                    }
                    Some(VisitState::InProgress) => {
                        let start = stack.iter().position(|s| *s == upstream).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[start..].to_vec();
                        cycle.push(upstream);
                        return Some(cycle.join(" -> "));
                    }
                    Some(VisitState::Done) => {}
                }
            }
        }

        stack.pop();
        state.insert(id, VisitState::Done);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}
