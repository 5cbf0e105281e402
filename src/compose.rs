//! Dependency composer
//!
//! Loads the transitive closure of a build description's subdirectory
//! references into an arena-indexed DAG. The closure is resolved for
//! one (family, os) pair: each description contributes the
//! subdirectory list in effect for that target, so an override can
//! drop or add dependencies per target OS. Cycle detection happens at
//! load time, before any generator invocation, by tracking the set of
//! descriptions on the current resolution path. Diamond dependencies
//! load once and share a node.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::generator::Artifact;
use crate::merge::EffectiveConfig;
use crate::spec::{BuildSpec, OsName, PlatformFamily, SpecError};

/// Index of a loaded description inside the arena
pub type SpecId = NodeIndex;

/// Errors composing the dependency graph
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A subdirectory reference loops back onto a description that is
    /// still being resolved. The dependency graph must be acyclic.
    #[error("cyclic dependency: {chain}")]
    CyclicDependency { chain: String },

    /// A declared library reference matched neither a sub-build
    /// artifact nor an explicit path.
    #[error("unresolved library `{logical}` (declared name `{declared}`) in project `{project}`")]
    UnresolvedLibrary {
        logical: String,
        declared: String,
        project: String,
    },
}

#[derive(Debug)]
struct Node {
    spec: BuildSpec,
    /// Project names from the root to this description, inclusive;
    /// used in failure diagnostics.
    chain: Vec<String>,
}

/// Arena of loaded build descriptions plus their subdirectory DAG,
/// resolved for one (family, os) target
#[derive(Debug)]
pub struct SpecArena {
    graph: DiGraph<Node, usize>,
    root: SpecId,
    /// Dependencies-first build order, fixed at load time
    order: Vec<SpecId>,
}

impl SpecArena {
    /// Load a description and, depth-first in declaration order, every
    /// description its effective subdirectory list for (family, os)
    /// reaches.
    pub fn load(
        root_path: &Path,
        family: PlatformFamily,
        os: OsName,
    ) -> Result<Self, ComposeError> {
        let mut graph: DiGraph<Node, usize> = DiGraph::new();
        let mut by_path: HashMap<PathBuf, SpecId> = HashMap::new();
        let mut stack: Vec<(PathBuf, String)> = Vec::new();

        let root = load_into(
            root_path,
            family,
            os,
            &mut graph,
            &mut by_path,
            &mut stack,
            &[],
        )?;

        // Load-time cycle detection makes this infallible; the check
        // stays as a guard against future loader changes.
        let order = match toposort(&graph, None) {
            Ok(mut order) => {
                order.reverse();
                order
            }
            Err(_) => {
                return Err(ComposeError::CyclicDependency {
                    chain: "dependency graph is cyclic".to_string(),
                })
            }
        };

        Ok(SpecArena { graph, root, order })
    }

    pub fn root(&self) -> SpecId {
        self.root
    }

    pub fn spec(&self, id: SpecId) -> &BuildSpec {
        &self.graph[id].spec
    }

    /// Project-name chain from the root to this description
    pub fn chain(&self, id: SpecId) -> &[String] {
        &self.graph[id].chain
    }

    /// Every loaded description, dependencies before dependents; the
    /// root is always last.
    pub fn build_order(&self) -> &[SpecId] {
        &self.order
    }

    /// Direct subdirectory dependencies of a description, in
    /// declaration order.
    pub fn dependencies(&self, id: SpecId) -> Vec<SpecId> {
        let mut edges: Vec<(usize, SpecId)> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| (*edge.weight(), edge.target()))
            .collect();
        edges.sort_by_key(|(index, _)| *index);
        edges.into_iter().map(|(_, id)| id).collect()
    }

    /// Every loaded description, dependencies first
    pub fn specs(&self) -> impl Iterator<Item = &BuildSpec> {
        self.order.iter().map(move |&id| &self.graph[id].spec)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

fn load_into(
    path: &Path,
    family: PlatformFamily,
    os: OsName,
    graph: &mut DiGraph<Node, usize>,
    by_path: &mut HashMap<PathBuf, SpecId>,
    stack: &mut Vec<(PathBuf, String)>,
    parent_chain: &[String],
) -> Result<SpecId, ComposeError> {
    let spec = BuildSpec::from_file(path)?;
    let canonical = spec
        .source_path
        .canonicalize()
        .unwrap_or_else(|_| spec.source_path.clone());

    if let Some(pos) = stack.iter().position(|(p, _)| *p == canonical) {
        let mut names: Vec<&str> = stack[pos..].iter().map(|(_, name)| name.as_str()).collect();
        names.push(&spec.project);
        return Err(ComposeError::CyclicDependency {
            chain: names.join(" -> "),
        });
    }

    if let Some(&existing) = by_path.get(&canonical) {
        return Ok(existing);
    }

    let mut chain = parent_chain.to_vec();
    chain.push(spec.project.clone());

    stack.push((canonical.clone(), spec.project.clone()));

    let spec_dir = spec.dir();
    let subdirectories = spec.subdirectories_for(family, os);
    let node = graph.add_node(Node { spec, chain: chain.clone() });
    by_path.insert(canonical, node);

    for (index, subdirectory) in subdirectories.iter().enumerate() {
        let child_path = spec_dir.join(subdirectory);
        let child = load_into(&child_path, family, os, graph, by_path, stack, &chain)?;
        graph.add_edge(node, child, index);
    }

    stack.pop();
    Ok(node)
}

/// Resolve a configuration's library references against the artifacts
/// its sub-builds produced, falling back to an explicit path.
pub fn resolve_libraries(
    effective: &EffectiveConfig,
    spec_dir: &Path,
    produced: &[Artifact],
) -> Result<Vec<Artifact>, ComposeError> {
    let mut resolved = Vec::with_capacity(effective.libraries.len());

    for (logical, library) in &effective.libraries {
        // Prefer an artifact matching the logical name, then one
        // matching the declared name.
        let artifact = produced
            .iter()
            .find(|a| a.logical_name == *logical)
            .or_else(|| produced.iter().find(|a| a.logical_name == library.name))
            .cloned();

        match artifact {
            Some(artifact) => resolved.push(artifact),
            None => match &library.path {
                Some(path) => resolved.push(Artifact {
                    path: spec_dir.join(path),
                    logical_name: logical.clone(),
                    project: library.name.clone(),
                }),
                None => {
                    return Err(ComposeError::UnresolvedLibrary {
                        logical: logical.clone(),
                        declared: library.name.clone(),
                        project: effective.project.clone(),
                    })
                }
            },
        }
    }

    Ok(resolved)
}
