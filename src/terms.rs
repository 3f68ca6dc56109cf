use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{GraphRead, OntologyWrite, distinct_ids};
use crate::domain::{TermId, normalize_description};
use crate::error::OntoError;
use crate::graph;

/// Returns the id of the term carrying `external_id`, or the term named
/// `description`, creating it when nothing matches.
///
/// A term that was created without an external id gets upgraded in place
/// when the same description later arrives with a real one.
pub fn get_or_create_term<W: OntologyWrite + ?Sized>(
    store: &mut W,
    description: &str,
    external_id: Option<&str>,
) -> Result<TermId, OntoError> {
    let description = normalize_description(description);
    if description.is_empty() {
        return Err(OntoError::InvalidTerm("empty description".to_string()));
    }
    let external_id = external_id
        .map(normalize_description)
        .filter(|value| !value.is_empty());

    match external_id {
        Some(external_id) => {
            if let Some(id) = store.find_by_external_id(&external_id).first() {
                return Ok(*id);
            }
            let synthetic = store
                .find_by_description(&description)
                .into_iter()
                .find(|id| store.term(*id).is_some_and(|term| term.has_synthetic_id()));
            if let Some(id) = synthetic {
                store.set_external_id(id, &external_id)?;
                debug!(%id, %description, %external_id, "upgraded synthetic external id");
                return Ok(id);
            }
            let id = store.insert_term(&description, Some(&external_id))?;
            debug!(%id, %description, %external_id, "created term");
            Ok(id)
        }
        None => {
            if let Some(id) = store.find_by_description(&description).first() {
                return Ok(*id);
            }
            let id = store.insert_term(&description, None)?;
            debug!(%id, %description, "created term with synthetic id");
            Ok(id)
        }
    }
}

/// Ids matching `name`, by external id first and then by description.
pub fn resolve<G: GraphRead + ?Sized>(
    graph: &G,
    name: &str,
    allow_external_id: bool,
) -> Vec<TermId> {
    if allow_external_id {
        let ids = graph.find_by_external_id(name);
        if !ids.is_empty() {
            return ids;
        }
    }
    graph.find_by_description(name)
}

/// Like [`resolve`], but falls back to the synonym index.
pub fn resolve_with_synonyms<G: GraphRead + ?Sized>(graph: &G, name: &str) -> Vec<TermId> {
    let ids = resolve(graph, name, true);
    if !ids.is_empty() {
        return ids;
    }
    match graph.get_synonym(name) {
        Some(id) => {
            debug!(%name, %id, "resolved term through synonym");
            vec![id]
        }
        None => Vec::new(),
    }
}

pub fn add_synonym<W: OntologyWrite + ?Sized>(
    store: &mut W,
    term: TermId,
    alias: &str,
) -> Result<bool, OntoError> {
    store.insert_synonym(alias, term)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTerm {
    pub description: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub parent_external_id: Option<String>,
    pub ontology: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddedTerm {
    pub term: TermId,
    pub parent: TermId,
}

/// Adds a term under `parent` (the root when absent) in `ontology`, together
/// with its synonyms.
pub fn add_term<W: OntologyWrite + ?Sized>(
    store: &mut W,
    new_term: &NewTerm,
) -> Result<AddedTerm, OntoError> {
    let description = normalize_description(&new_term.description);
    if description.is_empty() {
        return Err(OntoError::InvalidTerm("empty description".to_string()));
    }
    if description.contains(':') {
        return Err(OntoError::InvalidTerm(format!(
            "description {description} contains ':'; pass ontology ids as external_id"
        )));
    }
    let ontology = store.ontology_id(&new_term.ontology)?;
    let term = get_or_create_term(store, &description, new_term.external_id.as_deref())?;

    let parent = match new_term.parent.as_deref().map(normalize_description) {
        Some(parent) if !parent.is_empty() => {
            get_or_create_term(store, &parent, new_term.parent_external_id.as_deref())?
        }
        _ => store.root(),
    };
    graph::add_edge(store, term, parent, ontology)?;

    for alias in &new_term.synonyms {
        add_synonym(store, term, alias)?;
    }
    info!(%term, %parent, ontology = %new_term.ontology, "added term");
    Ok(AddedTerm { term, parent })
}

/// Descriptions and external ids for `ids`, in the same order.
pub fn names_and_external_ids<G: GraphRead + ?Sized>(
    graph: &G,
    ids: &[TermId],
) -> Result<(Vec<String>, Vec<String>), OntoError> {
    let mut names = Vec::with_capacity(ids.len());
    let mut external_ids = Vec::with_capacity(ids.len());
    for id in distinct_ids(ids.iter().copied()) {
        let term = graph
            .term(id)
            .ok_or_else(|| OntoError::NotFound(format!("term {id}")))?;
        names.push(term.description.clone());
        external_ids.push(term.external_id.clone());
    }
    Ok((names, external_ids))
}

pub fn display_name<G: GraphRead + ?Sized>(graph: &G, id: TermId) -> String {
    graph
        .term(id)
        .map(|term| term.description.clone())
        .unwrap_or_else(|| id.to_string())
}
