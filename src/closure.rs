use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::db::GraphRead;
use crate::domain::TermId;
use crate::error::OntoError;
use crate::graph;
use crate::terms;

/// Caller-owned memo of reflexive closures, keyed by term.
///
/// Valid only while the graph it was filled from is unchanged.
#[derive(Debug, Default)]
pub struct ParentCache {
    closures: HashMap<TermId, BTreeSet<TermId>>,
    hits: u64,
    misses: u64,
}

impl ParentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.closures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Result of one ancestor walk: the strict ancestors plus every `(term, from)`
/// edge that closed a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorWalk {
    pub ancestors: BTreeSet<TermId>,
    pub cycles: Vec<(TermId, TermId)>,
}

/// Walks parent edges from `seeds`. The seeds themselves and the root are
/// never part of the result, and each term is expanded at most once.
pub fn walk_ancestors<G: GraphRead + ?Sized>(graph: &G, seeds: &[TermId]) -> AncestorWalk {
    let seed_set: HashSet<TermId> = seeds.iter().copied().collect();
    let mut visited: HashSet<TermId> = seed_set.clone();
    let mut via: HashMap<TermId, TermId> = HashMap::new();
    let mut queue: VecDeque<TermId> = seeds.iter().copied().collect();
    let mut walk = AncestorWalk::default();

    while let Some(current) = queue.pop_front() {
        for parent in graph::parent_ids(graph, current) {
            if visited.insert(parent) {
                via.insert(parent, current);
                walk.ancestors.insert(parent);
                queue.push_back(parent);
                continue;
            }
            if on_path(&via, current, parent) {
                let guard = OntoError::CycleGuardTriggered {
                    term: parent,
                    from: current,
                };
                warn!(%guard, "term graph contains a cycle");
                walk.cycles.push((parent, current));
            } else if seed_set.contains(&parent) {
                debug!(term = %parent, from = %current, "edge back into the seed set");
            }
        }
    }
    debug!(
        seeds = seeds.len(),
        ancestors = walk.ancestors.len(),
        cycles = walk.cycles.len(),
        "collected ancestors"
    );
    walk
}

/// Strict ancestors of `seeds`.
pub fn ancestors<G: GraphRead + ?Sized>(graph: &G, seeds: &[TermId]) -> BTreeSet<TermId> {
    walk_ancestors(graph, seeds).ancestors
}

/// Whether `target` lies on the discovery path that led to `node`.
fn on_path(via: &HashMap<TermId, TermId>, mut node: TermId, target: TermId) -> bool {
    loop {
        if node == target {
            return true;
        }
        match via.get(&node) {
            Some(next) => node = *next,
            None => return false,
        }
    }
}

/// `{term}` plus every ancestor of `term`.
pub fn closure<G: GraphRead + ?Sized>(graph: &G, term: TermId) -> BTreeSet<TermId> {
    let mut set = ancestors(graph, &[term]);
    set.insert(term);
    set
}

pub fn closure_cached<'c, G: GraphRead + ?Sized>(
    graph: &G,
    term: TermId,
    cache: &'c mut ParentCache,
) -> &'c BTreeSet<TermId> {
    if cache.closures.contains_key(&term) {
        cache.hits += 1;
    } else {
        cache.misses += 1;
    }
    cache
        .closures
        .entry(term)
        .or_insert_with(|| closure(graph, term))
}

/// Name-based ancestor lookups over a term graph.
pub struct ParentClosureResolver<'g, G: GraphRead + ?Sized> {
    graph: &'g G,
}

impl<'g, G: GraphRead + ?Sized> ParentClosureResolver<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Resolves `name` by external id, description, then synonym.
    pub fn resolve_term(&self, name: &str, force_unique: bool) -> Result<Vec<TermId>, OntoError> {
        let ids = terms::resolve_with_synonyms(self.graph, name);
        if ids.is_empty() {
            return Err(OntoError::NotFound(format!("term {name}")));
        }
        if force_unique && ids.len() > 1 {
            return Err(OntoError::AmbiguousTerm {
                term: name.to_string(),
                count: ids.len(),
            });
        }
        Ok(ids)
    }

    pub fn get_parents(&self, name: &str, force_unique: bool) -> Result<BTreeSet<TermId>, OntoError> {
        let ids = self.resolve_term(name, force_unique)?;
        Ok(ancestors(self.graph, &ids))
    }

    pub fn get_parents_as_names_and_ids(
        &self,
        name: &str,
        force_unique: bool,
    ) -> Result<(Vec<String>, Vec<String>), OntoError> {
        let parents: Vec<TermId> = self.get_parents(name, force_unique)?.into_iter().collect();
        terms::names_and_external_ids(self.graph, &parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, OntologyWrite};
    use crate::domain::Edge;

    #[test]
    fn cache_counts_hits_and_misses() {
        let mut db = Database::new();
        let (a, b) = db
            .with_transaction(|tx| {
                let onto = tx.ontology_id("test")?;
                let a = tx.insert_term("a", None)?;
                let b = tx.insert_term("b", None)?;
                tx.insert_edge(Edge {
                    child: a,
                    parent: b,
                    ontology: onto,
                })?;
                Ok((a, b))
            })
            .unwrap();

        let mut cache = ParentCache::new();
        assert_eq!(
            closure_cached(&db, a, &mut cache),
            &BTreeSet::from([a, b])
        );
        closure_cached(&db, a, &mut cache);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    fn chain_db(edges: &[(&str, &str)]) -> Database {
        let mut db = Database::new();
        db.with_transaction(|tx| {
            let onto = tx.ontology_id("test")?;
            for (child, parent) in edges {
                let child = match tx.find_by_description(child).first() {
                    Some(id) => *id,
                    None => tx.insert_term(child, None)?,
                };
                let parent = match tx.find_by_description(parent).first() {
                    Some(id) => *id,
                    None => tx.insert_term(parent, None)?,
                };
                tx.insert_edge(Edge {
                    child,
                    parent,
                    ontology: onto,
                })?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn cycle_above_the_seed_is_reported() {
        let db = chain_db(&[("a", "b"), ("b", "c"), ("c", "b")]);
        let id = |name: &str| db.find_by_description(name)[0];

        let walk = walk_ancestors(&db, &[id("a")]);
        assert_eq!(walk.ancestors, BTreeSet::from([id("b"), id("c")]));
        assert_eq!(walk.cycles, vec![(id("b"), id("c"))]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let db = chain_db(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let id = |name: &str| db.find_by_description(name)[0];

        let walk = walk_ancestors(&db, &[id("a")]);
        assert_eq!(walk.ancestors.len(), 3);
        assert!(walk.cycles.is_empty());
    }
}
