use tracing::debug;

use crate::db::{GraphRead, OntologyWrite, distinct_ids};
use crate::domain::{Edge, OntologyId, TermId};
use crate::error::OntoError;

/// Direct parents of `term`, root excluded, in edge order without repeats.
pub fn parent_ids<G: GraphRead + ?Sized>(graph: &G, term: TermId) -> Vec<TermId> {
    let root = graph.root();
    distinct_ids(
        graph
            .get_edges(term)
            .iter()
            .map(|edge| edge.parent)
            .filter(|parent| *parent != root),
    )
}

/// Direct children of `term` without repeats.
pub fn child_ids<G: GraphRead + ?Sized>(graph: &G, term: TermId) -> Vec<TermId> {
    distinct_ids(graph.get_reverse_edges(term).iter().map(|edge| edge.child))
}

pub fn add_edge<W: OntologyWrite + ?Sized>(
    store: &mut W,
    child: TermId,
    parent: TermId,
    ontology: OntologyId,
) -> Result<bool, OntoError> {
    if child == store.root() {
        return Err(OntoError::InvalidTerm(
            "the root term cannot have parents".to_string(),
        ));
    }
    if child == parent {
        return Err(OntoError::InvalidTerm(format!(
            "term {child} cannot be its own parent"
        )));
    }
    let inserted = store.insert_edge(Edge {
        child,
        parent,
        ontology,
    })?;
    if inserted {
        debug!(%child, %parent, %ontology, "added is-a edge");
    }
    Ok(inserted)
}
