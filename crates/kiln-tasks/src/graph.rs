//! Group graph construction and execution plans

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use kiln_core::GroupMode;
use tracing::{debug, instrument};

use crate::task::Runnable;

/// A registered name in the graph
#[derive(Debug, Clone)]
struct GraphNode {
    kind: &'static str,
    mode: Option<GroupMode>,
    members: Vec<String>,
}

/// Reference graph of registered tasks and groups.
///
/// Edges point from a group to its members. Building the graph checks that
/// every member exists and that no group contains itself.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, GraphNode>,
    /// Topologically sorted names, groups before their members
    sorted_order: Vec<String>,
}

impl TaskGraph {
    /// Build the graph from registered entries
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn build(entries: &HashMap<String, Runnable>) -> Result<Self, GraphError> {
        // Sorted for deterministic error reporting
        let ordered: BTreeMap<&String, &Runnable> = entries.iter().collect();

        let mut nodes = HashMap::with_capacity(entries.len());
        for (name, runnable) in &ordered {
            for member in runnable.members() {
                if !entries.contains_key(member) {
                    return Err(GraphError::UnknownReference {
                        group: (*name).clone(),
                        member: member.clone(),
                    });
                }
            }
            let mode = match runnable {
                Runnable::Group(group) => Some(group.mode),
                Runnable::Task(_) => None,
            };
            nodes.insert(
                (*name).clone(),
                GraphNode {
                    kind: runnable.kind(),
                    mode,
                    members: runnable.members().to_vec(),
                },
            );
        }

        let sorted_order = Self::topological_sort(&nodes)?;
        debug!(nodes = nodes.len(), "task graph built");

        Ok(Self {
            nodes,
            sorted_order,
        })
    }

    /// Topological sort using Kahn's algorithm
    fn topological_sort(nodes: &HashMap<String, GraphNode>) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<&str, usize> = nodes.keys().map(|k| (k.as_str(), 0)).collect();
        for node in nodes.values() {
            for member in &node.members {
                if let Some(degree) = in_degree.get_mut(member.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut roots: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        roots.sort_unstable();
        let mut queue: VecDeque<&str> = roots.into();
        let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

        while let Some(name) = queue.pop_front() {
            sorted.push(name.to_string());
            if let Some(node) = nodes.get(name) {
                for member in &node.members {
                    if let Some(degree) = in_degree.get_mut(member.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(member.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != nodes.len() {
            let in_sorted: HashSet<&str> = sorted.iter().map(String::as_str).collect();
            // Plain tasks below a cycle are left over too but cannot be part of it
            let mut cyclic: Vec<&str> = nodes
                .iter()
                .filter(|(name, node)| node.mode.is_some() && !in_sorted.contains(name.as_str()))
                .map(|(name, _)| name.as_str())
                .collect();
            cyclic.sort_unstable();
            return Err(GraphError::Cycle(cyclic.join(", ")));
        }

        Ok(sorted)
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names in topological order, groups before their members
    pub fn sorted(&self) -> &[String] {
        &self.sorted_order
    }

    /// The execution tree of a target
    pub fn plan(&self, name: &str) -> Option<PlanNode> {
        let node = self.nodes.get(name)?;
        Some(match node.mode {
            None => PlanNode::Task {
                name: name.to_string(),
                kind: node.kind,
            },
            Some(mode) => PlanNode::Group {
                name: name.to_string(),
                mode,
                members: node
                    .members
                    .iter()
                    .filter_map(|member| self.plan(member))
                    .collect(),
            },
        })
    }

    /// Tasks a target runs, in plan order
    pub fn leaves(&self, name: &str) -> Vec<String> {
        self.plan(name)
            .map(|plan| plan.leaves().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }
}

/// A node of an execution plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    /// A task
    Task { name: String, kind: &'static str },
    /// A group and its members
    Group {
        name: String,
        mode: GroupMode,
        members: Vec<PlanNode>,
    },
}

impl PlanNode {
    /// Name of the node
    pub fn name(&self) -> &str {
        match self {
            Self::Task { name, .. } | Self::Group { name, .. } => name,
        }
    }

    /// Task names under this node, in order
    pub fn leaves(&self) -> Vec<&str> {
        match self {
            Self::Task { name, .. } => vec![name.as_str()],
            Self::Group { members, .. } => members.iter().flat_map(PlanNode::leaves).collect(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::Task { name, kind } => writeln!(f, "{}{} [{}]", indent, name, kind),
            Self::Group {
                name,
                mode,
                members,
            } => {
                let mode = match mode {
                    GroupMode::Series => "series",
                    GroupMode::Parallel => "parallel",
                };
                writeln!(f, "{}{} ({})", indent, name, mode)?;
                for member in members {
                    member.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Errors during graph construction
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A group names something that is not registered
    #[error("Group '{group}' references unknown task '{member}'")]
    UnknownReference { group: String, member: String },

    /// Groups that contain themselves
    #[error("Cyclic group reference among: {0}")]
    Cycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{GroupConfig, PipelineConfig, StepConfig, TaskConfig};

    fn pipeline() -> Runnable {
        Runnable::Task(TaskConfig::Pipeline(
            PipelineConfig::new(["src/a.js"]).step(StepConfig::dest("dist")),
        ))
    }

    fn entries(items: Vec<(&str, Runnable)>) -> HashMap<String, Runnable> {
        items
            .into_iter()
            .map(|(name, runnable)| (name.to_string(), runnable))
            .collect()
    }

    #[test]
    fn test_build_graph() {
        let entries = entries(vec![
            ("main-sass", pipeline()),
            ("common-css-dist", pipeline()),
            ("css", GroupConfig::series(["main-sass", "common-css-dist"]).into()),
        ]);

        let graph = TaskGraph::build(&entries).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.sorted()[0], "css");
        assert!(graph.contains("main-sass"));
    }

    #[test]
    fn test_unknown_reference() {
        let entries = entries(vec![("css", GroupConfig::series(["missing"]).into())]);

        let err = TaskGraph::build(&entries).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownReference { ref group, ref member } if group == "css" && member == "missing"
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let entries = entries(vec![
            ("a", GroupConfig::series(["b"]).into()),
            ("b", GroupConfig::parallel(["task", "a"]).into()),
            ("task", pipeline()),
        ]);

        match TaskGraph::build(&entries).unwrap_err() {
            GraphError::Cycle(names) => assert_eq!(names, "a, b"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let entries = entries(vec![("a", GroupConfig::series(["a"]).into())]);
        assert!(matches!(
            TaskGraph::build(&entries).unwrap_err(),
            GraphError::Cycle(_)
        ));
    }

    #[test]
    fn test_shared_member_is_not_a_cycle() {
        let entries = entries(vec![
            ("x", pipeline()),
            ("a", GroupConfig::series(["x"]).into()),
            ("b", GroupConfig::parallel(["x", "a"]).into()),
        ]);
        assert!(TaskGraph::build(&entries).is_ok());
    }

    #[test]
    fn test_plan_and_leaves() {
        let entries = entries(vec![
            ("common-js", pipeline()),
            ("common-js-dist", pipeline()),
            ("watch", Runnable::Task(TaskConfig::Watch)),
            ("js", GroupConfig::series(["common-js", "common-js-dist"]).into()),
            ("dev", GroupConfig::parallel(["js", "watch"]).into()),
        ]);
        let graph = TaskGraph::build(&entries).unwrap();

        let plan = graph.plan("dev").unwrap();
        assert_eq!(plan.name(), "dev");
        assert_eq!(
            graph.leaves("dev"),
            vec!["common-js", "common-js-dist", "watch"]
        );
        assert_eq!(
            plan.to_string(),
            "dev (parallel)\n  js (series)\n    common-js [pipeline]\n    common-js-dist [pipeline]\n  watch [watch]\n"
        );
        assert!(graph.plan("missing").is_none());
    }
}
