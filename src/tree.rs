use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::closure::ParentClosureResolver;
use crate::db::GraphRead;
use crate::domain::TermId;
use crate::error::OntoError;
use crate::graph;
use crate::terms;

/// Enumerates maximal parent chains, opening at most `max_chains` chains.
#[derive(Debug, Clone, Copy)]
pub struct TreeEnumerator {
    max_chains: usize,
}

impl TreeEnumerator {
    pub fn new(max_chains: usize) -> Self {
        Self { max_chains }
    }

    pub fn enumerate<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        name: &str,
        force_unique: bool,
    ) -> Result<Vec<Vec<TermId>>, OntoError> {
        let ids = ParentClosureResolver::new(graph).resolve_term(name, force_unique)?;
        Ok(self.enumerate_from_ids(graph, &ids))
    }

    pub fn enumerate_names<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        name: &str,
        force_unique: bool,
    ) -> Result<Vec<Vec<String>>, OntoError> {
        let chains = self.enumerate(graph, name, force_unique)?;
        Ok(chains
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(|id| terms::display_name(graph, *id))
                    .collect()
            })
            .collect())
    }

    pub fn enumerate_from_ids<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        seeds: &[TermId],
    ) -> Vec<Vec<TermId>> {
        let mut open: Vec<Vec<TermId>> = seeds.iter().map(|id| vec![*id]).collect();
        let mut opened = open.len();
        let mut closed = Vec::new();
        let mut dropped = 0usize;

        while let Some(mut chain) = open.pop() {
            let Some(tail) = chain.last().copied() else {
                continue;
            };
            let mut parents = Vec::new();
            for parent in graph::parent_ids(graph, tail) {
                if chain.contains(&parent) {
                    warn!(term = %tail, %parent, "cycle in parent chain; not extending");
                } else {
                    parents.push(parent);
                }
            }
            let Some((first, rest)) = parents.split_first() else {
                closed.push(chain);
                continue;
            };
            for other in rest {
                if opened >= self.max_chains {
                    dropped += 1;
                    continue;
                }
                let mut fork = chain.clone();
                fork.push(*other);
                open.push(fork);
                opened += 1;
            }
            chain.push(*first);
            open.push(chain);
        }

        if dropped > 0 {
            debug!(dropped, max_chains = self.max_chains, "chain budget exhausted");
        }
        remove_dominated(closed)
    }
}

/// Drops chains whose node set equals an earlier chain's set or is a strict
/// subset of any other chain's set.
pub fn remove_dominated(chains: Vec<Vec<TermId>>) -> Vec<Vec<TermId>> {
    let sets: Vec<BTreeSet<TermId>> = chains
        .iter()
        .map(|chain| chain.iter().copied().collect())
        .collect();
    chains
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            !sets.iter().enumerate().any(|(j, other)| {
                if *i == j {
                    return false;
                }
                let set = &sets[*i];
                (j < *i && set == other) || (set.len() < other.len() && set.is_subset(other))
            })
        })
        .map(|(_, chain)| chain)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominated_chains_are_removed() {
        let chains = vec![
            vec![TermId(1), TermId(2)],
            vec![TermId(1), TermId(2), TermId(3)],
            vec![TermId(2), TermId(1), TermId(3)],
            vec![TermId(4)],
        ];
        let kept = remove_dominated(chains);
        assert_eq!(
            kept,
            vec![vec![TermId(1), TermId(2), TermId(3)], vec![TermId(4)]]
        );
    }
}
