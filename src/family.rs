use std::collections::{BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::GraphRead;
use crate::domain::{Relation, TermId};
use crate::error::OntoError;
use crate::graph;
use crate::terms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyNode {
    pub id: TermId,
    pub name: String,
}

/// Directed parent -> child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FamilyEdge {
    pub source: TermId,
    pub target: TermId,
}

/// Node-link graph, the shape graph-visualization tools read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FamilyGraph {
    pub nodes: Vec<FamilyNode>,
    pub edges: Vec<FamilyEdge>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FamilyReport {
    pub graph: FamilyGraph,
    pub not_found: Vec<String>,
    pub ambiguous: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FamilyGraphBuilder {
    max_children: usize,
    force_unique: bool,
}

impl FamilyGraphBuilder {
    pub fn new(max_children: usize, force_unique: bool) -> Self {
        Self {
            max_children,
            force_unique,
        }
    }

    pub fn build<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        names: &[String],
        relation: Relation,
    ) -> Result<FamilyReport, OntoError> {
        let mut report = FamilyReport::default();
        let root = graph.root();
        let mut seeds = Vec::new();
        for name in names {
            let ids = terms::resolve_with_synonyms(graph, name);
            if ids.is_empty() {
                warn!(%name, "family seed not found");
                report.not_found.push(name.clone());
                continue;
            }
            if ids.len() > 1 {
                if self.force_unique {
                    return Err(OntoError::AmbiguousTerm {
                        term: name.clone(),
                        count: ids.len(),
                    });
                }
                report.ambiguous.push(name.clone());
            }
            seeds.extend(ids.into_iter().filter(|id| *id != root));
        }

        let mut nodes: BTreeSet<TermId> = seeds.iter().copied().collect();
        let mut edges: BTreeSet<FamilyEdge> = BTreeSet::new();

        if relation.includes_parents() {
            let visited = walk_parents(graph, &seeds, &mut edges);
            nodes.extend(visited);
        }
        if relation.includes_children() {
            let (visited, truncated) = self.walk_children(graph, &seeds, &mut edges);
            nodes.extend(visited);
            report.truncated = truncated;
        }

        report.graph = FamilyGraph {
            nodes: nodes
                .into_iter()
                .map(|id| FamilyNode {
                    id,
                    name: terms::display_name(graph, id),
                })
                .collect(),
            edges: edges.into_iter().collect(),
        };
        debug!(
            nodes = report.graph.nodes.len(),
            edges = report.graph.edges.len(),
            truncated = report.truncated,
            "built family graph"
        );
        Ok(report)
    }

    /// Stops accepting new nodes once the walk has visited more than
    /// `max_children` distinct nodes, seeds included.
    fn walk_children<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        seeds: &[TermId],
        edges: &mut BTreeSet<FamilyEdge>,
    ) -> (HashSet<TermId>, bool) {
        let mut visited: HashSet<TermId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<TermId> = seeds.iter().copied().collect();
        let mut truncated = false;

        while let Some(current) = queue.pop_front() {
            for child in graph::child_ids(graph, current) {
                if visited.contains(&child) {
                    edges.insert(FamilyEdge {
                        source: current,
                        target: child,
                    });
                    continue;
                }
                if visited.len() > self.max_children {
                    truncated = true;
                    continue;
                }
                visited.insert(child);
                edges.insert(FamilyEdge {
                    source: current,
                    target: child,
                });
                queue.push_back(child);
            }
        }
        if truncated {
            debug!(max_children = self.max_children, "child walk truncated");
        }
        (visited, truncated)
    }
}

fn walk_parents<G: GraphRead + ?Sized>(
    graph: &G,
    seeds: &[TermId],
    edges: &mut BTreeSet<FamilyEdge>,
) -> HashSet<TermId> {
    let mut visited: HashSet<TermId> = seeds.iter().copied().collect();
    let mut queue: VecDeque<TermId> = seeds.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        for parent in graph::parent_ids(graph, current) {
            edges.insert(FamilyEdge {
                source: parent,
                target: current,
            });
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    visited
}
