use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    AnnotationId, AnnotationRecord, Edge, LedgerEntry, Ontology, OntologyId, Projection,
    ROOT_DESCRIPTION, Synonym, Term, TermId, normalize_description, synthetic_external_id,
};
use crate::error::OntoError;
use crate::ledger::{Ledger, LedgerDelta, PairDelta};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

pub const FAILPOINT_CLOSURE_WRITE: &str = "closure.write";
pub const FAILPOINT_CLOSURE_DELETE: &str = "closure.delete";
pub const FAILPOINT_LEDGER_APPLY: &str = "ledger.apply";
pub const FAILPOINT_PAIRS_APPLY: &str = "pairs.apply";

/// Read side of the persistence boundary: terms, edges and synonyms.
pub trait GraphRead {
    fn term(&self, id: TermId) -> Option<&Term>;
    fn find_by_external_id(&self, external_id: &str) -> Vec<TermId>;
    fn find_by_description(&self, description: &str) -> Vec<TermId>;
    /// Parent edges of `term`.
    fn get_edges(&self, term: TermId) -> &[Edge];
    /// Child edges of `term`.
    fn get_reverse_edges(&self, term: TermId) -> &[Edge];
    fn get_synonym(&self, alias: &str) -> Option<TermId>;
    fn ontology_name(&self, id: OntologyId) -> Option<&str>;
    fn root(&self) -> TermId;
}

/// Write side of the persistence boundary. Every call made through a
/// [`Transaction`] is undone if the transaction is not committed.
pub trait OntologyWrite: GraphRead {
    fn insert_term(&mut self, description: &str, external_id: Option<&str>)
    -> Result<TermId, OntoError>;
    fn set_external_id(&mut self, term: TermId, external_id: &str) -> Result<(), OntoError>;
    fn insert_edge(&mut self, edge: Edge) -> Result<bool, OntoError>;
    fn insert_synonym(&mut self, alias: &str, canonical: TermId) -> Result<bool, OntoError>;
    fn ontology_id(&mut self, name: &str) -> Result<OntologyId, OntoError>;

    fn annotation(&self, id: AnnotationId) -> Option<&AnnotationRecord>;
    fn allocate_annotation_id(&mut self) -> AnnotationId;
    fn put_annotation(&mut self, record: AnnotationRecord) -> Result<(), OntoError>;
    fn remove_annotation(&mut self, id: AnnotationId)
    -> Result<Option<AnnotationRecord>, OntoError>;

    fn read_closure_rows(&self, annotation: AnnotationId) -> Option<&Projection>;
    fn write_closure_rows(&mut self, projection: Projection) -> Result<(), OntoError>;
    fn delete_closure_rows(&mut self, annotation: AnnotationId)
    -> Result<Option<Projection>, OntoError>;

    fn read_ledger(&self, term: TermId) -> LedgerEntry;
    fn apply_ledger_delta(&mut self, delta: LedgerDelta) -> Result<(), OntoError>;
    fn apply_pair_delta(&mut self, delta: PairDelta) -> Result<(), OntoError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub root: TermId,
    pub next_term: u64,
    pub next_ontology: u32,
    pub next_annotation: u64,
    pub terms: Vec<Term>,
    pub edges: Vec<Edge>,
    pub synonyms: Vec<Synonym>,
    pub ontologies: Vec<Ontology>,
    pub annotations: Vec<AnnotationRecord>,
    pub projections: Vec<Projection>,
    pub ledger: Ledger,
}

#[derive(Debug, Clone)]
pub struct Database {
    terms: BTreeMap<TermId, Term>,
    by_description: HashMap<String, Vec<TermId>>,
    by_external_id: HashMap<String, Vec<TermId>>,
    parents: HashMap<TermId, Vec<Edge>>,
    children: HashMap<TermId, Vec<Edge>>,
    synonyms: BTreeMap<String, Vec<TermId>>,
    ontologies: BTreeMap<OntologyId, String>,
    annotations: BTreeMap<AnnotationId, AnnotationRecord>,
    projections: BTreeMap<AnnotationId, Projection>,
    ledger: Ledger,
    root: TermId,
    next_term: u64,
    next_ontology: u32,
    next_annotation: u64,
    failpoints: HashMap<String, u64>,
    failpoint_hits: HashMap<String, u64>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        let mut db = Self {
            terms: BTreeMap::new(),
            by_description: HashMap::new(),
            by_external_id: HashMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            synonyms: BTreeMap::new(),
            ontologies: BTreeMap::new(),
            annotations: BTreeMap::new(),
            projections: BTreeMap::new(),
            ledger: Ledger::new(),
            root: TermId(1),
            next_term: 1,
            next_ontology: 1,
            next_annotation: 1,
            failpoints: HashMap::new(),
            failpoint_hits: HashMap::new(),
        };
        let root = db.raw_insert_term(ROOT_DESCRIPTION, Some(ROOT_DESCRIPTION));
        db.root = root;
        db
    }

    /// Arms failpoints. `"ledger.apply"` fails on the first hit,
    /// `"ledger.apply@3"` on the third.
    pub fn set_failpoints<I, S>(&mut self, failpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.failpoints.clear();
        self.failpoint_hits.clear();
        for entry in failpoints {
            match parse_failpoint(entry.as_ref()) {
                Ok((name, nth)) => {
                    self.failpoints.insert(name.to_string(), nth);
                }
                Err(err) => warn!(%err, "ignoring failpoint"),
            }
        }
    }

    pub fn transaction(&mut self) -> Transaction<'_> {
        Transaction {
            db: self,
            undo: Vec::new(),
            finished: false,
        }
    }

    /// Runs `f` in a transaction, committing on `Ok` and rolling back on `Err`.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T, OntoError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, OntoError>,
    {
        let mut tx = self.transaction();
        match f(&mut tx) {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.parents.values().flatten()
    }

    pub fn synonyms(&self) -> impl Iterator<Item = Synonym> + '_ {
        self.synonyms.iter().flat_map(|(alias, ids)| {
            ids.iter().map(move |id| Synonym {
                alias: alias.clone(),
                canonical: *id,
            })
        })
    }

    pub fn annotations(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.annotations.values()
    }

    pub fn projections(&self) -> impl Iterator<Item = &Projection> {
        self.projections.values()
    }

    pub fn projection(&self, annotation: AnnotationId) -> Option<&Projection> {
        self.projections.get(&annotation)
    }

    pub fn closure_row_count(&self) -> usize {
        self.projections.values().map(|p| p.rows.len()).sum()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Replaces the materialized closure table and ledger in one step and
    /// returns the previous ones.
    pub fn swap_materialized(
        &mut self,
        projections: BTreeMap<AnnotationId, Projection>,
        ledger: Ledger,
    ) -> (BTreeMap<AnnotationId, Projection>, Ledger) {
        let old_projections = std::mem::replace(&mut self.projections, projections);
        let old_ledger = std::mem::replace(&mut self.ledger, ledger);
        (old_projections, old_ledger)
    }

    /// Rebuilds the description, external-id and adjacency lookups from the
    /// term and edge tables.
    pub fn reindex(&mut self) {
        let edges: Vec<Edge> = self.edges().copied().collect();
        self.by_description.clear();
        self.by_external_id.clear();
        self.parents.clear();
        self.children.clear();
        for term in self.terms.values() {
            self.by_description
                .entry(term.description.clone())
                .or_default()
                .push(term.id);
            self.by_external_id
                .entry(term.external_id.clone())
                .or_default()
                .push(term.id);
        }
        for edge in edges {
            self.parents.entry(edge.child).or_default().push(edge);
            self.children.entry(edge.parent).or_default().push(edge);
        }
        for list in self.parents.values_mut() {
            list.sort();
        }
        for list in self.children.values_mut() {
            list.sort();
        }
        debug!(
            terms = self.terms.len(),
            edges = self.parents.values().map(Vec::len).sum::<usize>(),
            "reindexed term graph"
        );
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            root: self.root,
            next_term: self.next_term,
            next_ontology: self.next_ontology,
            next_annotation: self.next_annotation,
            terms: self.terms.values().cloned().collect(),
            edges: {
                let mut edges: Vec<Edge> = self.edges().copied().collect();
                edges.sort();
                edges
            },
            synonyms: self.synonyms().collect(),
            ontologies: self
                .ontologies
                .iter()
                .map(|(id, name)| Ontology {
                    id: *id,
                    name: name.clone(),
                })
                .collect(),
            annotations: self.annotations.values().cloned().collect(),
            projections: self.projections.values().cloned().collect(),
            ledger: self.ledger.clone(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, OntoError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(OntoError::Snapshot(format!(
                "unsupported snapshot format version {}",
                snapshot.format_version
            )));
        }
        let mut db = Self {
            terms: snapshot.terms.into_iter().map(|t| (t.id, t)).collect(),
            by_description: HashMap::new(),
            by_external_id: HashMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            synonyms: BTreeMap::new(),
            ontologies: snapshot
                .ontologies
                .into_iter()
                .map(|o| (o.id, o.name))
                .collect(),
            annotations: snapshot
                .annotations
                .into_iter()
                .map(|a| (a.id, a))
                .collect(),
            projections: snapshot
                .projections
                .into_iter()
                .map(|p| (p.annotation, p))
                .collect(),
            ledger: snapshot.ledger,
            root: snapshot.root,
            next_term: snapshot.next_term,
            next_ontology: snapshot.next_ontology,
            next_annotation: snapshot.next_annotation,
            failpoints: HashMap::new(),
            failpoint_hits: HashMap::new(),
        };
        if !db.terms.contains_key(&db.root) {
            return Err(OntoError::Snapshot(format!(
                "root term {} missing from snapshot",
                db.root
            )));
        }
        for synonym in snapshot.synonyms {
            db.synonyms
                .entry(synonym.alias)
                .or_default()
                .push(synonym.canonical);
        }
        for edge in snapshot.edges {
            if !db.terms.contains_key(&edge.child) || !db.terms.contains_key(&edge.parent) {
                return Err(OntoError::Snapshot(format!(
                    "edge {} -> {} references a missing term",
                    edge.child, edge.parent
                )));
            }
            db.parents.entry(edge.child).or_default().push(edge);
        }
        db.reindex();
        Ok(db)
    }

    fn raw_insert_term(&mut self, description: &str, external_id: Option<&str>) -> TermId {
        let id = TermId(self.next_term);
        self.next_term += 1;
        let external_id = match external_id {
            Some(value) if !value.trim().is_empty() => value.trim().to_lowercase(),
            _ => synthetic_external_id(id),
        };
        let term = Term {
            id,
            description: normalize_description(description),
            external_id,
        };
        self.by_description
            .entry(term.description.clone())
            .or_default()
            .push(id);
        self.by_external_id
            .entry(term.external_id.clone())
            .or_default()
            .push(id);
        self.terms.insert(id, term);
        id
    }

    fn raw_remove_term(&mut self, id: TermId) {
        if let Some(term) = self.terms.remove(&id) {
            remove_from_index(&mut self.by_description, &term.description, id);
            remove_from_index(&mut self.by_external_id, &term.external_id, id);
        }
    }

    fn raw_set_external_id(&mut self, id: TermId, external_id: String) -> Option<String> {
        let term = self.terms.get_mut(&id)?;
        let previous = std::mem::replace(&mut term.external_id, external_id.clone());
        remove_from_index(&mut self.by_external_id, &previous, id);
        self.by_external_id.entry(external_id).or_default().push(id);
        Some(previous)
    }

    fn raw_remove_edge(&mut self, edge: &Edge) {
        if let Some(list) = self.parents.get_mut(&edge.child) {
            list.retain(|e| e != edge);
            if list.is_empty() {
                self.parents.remove(&edge.child);
            }
        }
        if let Some(list) = self.children.get_mut(&edge.parent) {
            list.retain(|e| e != edge);
            if list.is_empty() {
                self.children.remove(&edge.parent);
            }
        }
    }

    fn check_failpoint(&mut self, key: &str) -> Result<(), OntoError> {
        let Some(trigger) = self.failpoints.get(key).copied() else {
            return Ok(());
        };
        let hits = self.failpoint_hits.entry(key.to_string()).or_insert(0);
        *hits += 1;
        if *hits == trigger {
            return Err(OntoError::TransactionFailure(format!("failpoint {key}")));
        }
        Ok(())
    }
}

impl GraphRead for Database {
    fn term(&self, id: TermId) -> Option<&Term> {
        self.terms.get(&id)
    }

    fn find_by_external_id(&self, external_id: &str) -> Vec<TermId> {
        self.by_external_id
            .get(&external_id.trim().to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn find_by_description(&self, description: &str) -> Vec<TermId> {
        self.by_description
            .get(&normalize_description(description))
            .cloned()
            .unwrap_or_default()
    }

    fn get_edges(&self, term: TermId) -> &[Edge] {
        self.parents.get(&term).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get_reverse_edges(&self, term: TermId) -> &[Edge] {
        self.children.get(&term).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get_synonym(&self, alias: &str) -> Option<TermId> {
        self.synonyms
            .get(&normalize_description(alias))
            .and_then(|ids| ids.first().copied())
    }

    fn ontology_name(&self, id: OntologyId) -> Option<&str> {
        self.ontologies.get(&id).map(String::as_str)
    }

    fn root(&self) -> TermId {
        self.root
    }
}

type Undo = Box<dyn FnOnce(&mut Database)>;

/// A unit of work over a [`Database`]. Each write records its inverse; an
/// uncommitted transaction replays those inverses newest-first when dropped.
pub struct Transaction<'a> {
    db: &'a mut Database,
    undo: Vec<Undo>,
    finished: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) {
        debug!(writes = self.undo.len(), "transaction committed");
        self.undo.clear();
        self.finished = true;
    }

    pub fn rollback(mut self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        let writes = self.undo.len();
        while let Some(undo) = self.undo.pop() {
            undo(self.db);
        }
        self.finished = true;
        if writes > 0 {
            debug!(writes, "transaction rolled back");
        }
    }

    fn record(&mut self, undo: impl FnOnce(&mut Database) + 'static) {
        self.undo.push(Box::new(undo));
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if !self.undo.is_empty() {
                warn!(
                    writes = self.undo.len(),
                    "transaction dropped without commit; rolling back"
                );
            }
            self.rollback_in_place();
        }
    }
}

impl GraphRead for Transaction<'_> {
    fn term(&self, id: TermId) -> Option<&Term> {
        self.db.term(id)
    }

    fn find_by_external_id(&self, external_id: &str) -> Vec<TermId> {
        self.db.find_by_external_id(external_id)
    }

    fn find_by_description(&self, description: &str) -> Vec<TermId> {
        self.db.find_by_description(description)
    }

    fn get_edges(&self, term: TermId) -> &[Edge] {
        self.db.get_edges(term)
    }

    fn get_reverse_edges(&self, term: TermId) -> &[Edge] {
        self.db.get_reverse_edges(term)
    }

    fn get_synonym(&self, alias: &str) -> Option<TermId> {
        self.db.get_synonym(alias)
    }

    fn ontology_name(&self, id: OntologyId) -> Option<&str> {
        self.db.ontology_name(id)
    }

    fn root(&self) -> TermId {
        self.db.root()
    }
}

impl OntologyWrite for Transaction<'_> {
    fn insert_term(
        &mut self,
        description: &str,
        external_id: Option<&str>,
    ) -> Result<TermId, OntoError> {
        if normalize_description(description).is_empty() {
            return Err(OntoError::InvalidTerm("empty description".to_string()));
        }
        let id = self.db.raw_insert_term(description, external_id);
        self.record(move |db| {
            db.raw_remove_term(id);
            db.next_term -= 1;
        });
        Ok(id)
    }

    fn set_external_id(&mut self, term: TermId, external_id: &str) -> Result<(), OntoError> {
        let external_id = external_id.trim().to_lowercase();
        let previous = self
            .db
            .raw_set_external_id(term, external_id)
            .ok_or_else(|| OntoError::NotFound(format!("term {term}")))?;
        self.record(move |db| {
            db.raw_set_external_id(term, previous);
        });
        Ok(())
    }

    fn insert_edge(&mut self, edge: Edge) -> Result<bool, OntoError> {
        if self.db.term(edge.child).is_none() {
            return Err(OntoError::NotFound(format!("term {}", edge.child)));
        }
        if self.db.term(edge.parent).is_none() {
            return Err(OntoError::NotFound(format!("term {}", edge.parent)));
        }
        if self.db.get_edges(edge.child).contains(&edge) {
            return Ok(false);
        }
        self.db.parents.entry(edge.child).or_default().push(edge);
        self.db.children.entry(edge.parent).or_default().push(edge);
        self.record(move |db| db.raw_remove_edge(&edge));
        Ok(true)
    }

    fn insert_synonym(&mut self, alias: &str, canonical: TermId) -> Result<bool, OntoError> {
        if self.db.term(canonical).is_none() {
            return Err(OntoError::NotFound(format!("term {canonical}")));
        }
        let alias = normalize_description(alias);
        if alias.is_empty() {
            return Err(OntoError::InvalidTerm("empty synonym".to_string()));
        }
        let ids = self.db.synonyms.entry(alias.clone()).or_default();
        if ids.contains(&canonical) {
            return Ok(false);
        }
        ids.push(canonical);
        self.record(move |db| {
            if let Some(ids) = db.synonyms.get_mut(&alias) {
                ids.retain(|id| *id != canonical);
                if ids.is_empty() {
                    db.synonyms.remove(&alias);
                }
            }
        });
        Ok(true)
    }

    fn ontology_id(&mut self, name: &str) -> Result<OntologyId, OntoError> {
        let name = normalize_description(name);
        if name.is_empty() {
            return Err(OntoError::InvalidTerm("empty ontology name".to_string()));
        }
        if let Some((id, _)) = self.db.ontologies.iter().find(|(_, n)| **n == name) {
            return Ok(*id);
        }
        let id = OntologyId(self.db.next_ontology);
        self.db.next_ontology += 1;
        self.db.ontologies.insert(id, name);
        self.record(move |db| {
            db.ontologies.remove(&id);
            db.next_ontology -= 1;
        });
        Ok(id)
    }

    fn annotation(&self, id: AnnotationId) -> Option<&AnnotationRecord> {
        self.db.annotations.get(&id)
    }

    fn allocate_annotation_id(&mut self) -> AnnotationId {
        let id = AnnotationId(self.db.next_annotation);
        self.db.next_annotation += 1;
        self.record(|db| db.next_annotation -= 1);
        id
    }

    fn put_annotation(&mut self, record: AnnotationRecord) -> Result<(), OntoError> {
        let id = record.id;
        if id.0 >= self.db.next_annotation {
            let previous_next = self.db.next_annotation;
            self.db.next_annotation = id.0 + 1;
            self.record(move |db| db.next_annotation = previous_next);
        }
        let previous = self.db.annotations.insert(id, record);
        self.record(move |db| {
            match previous {
                Some(previous) => db.annotations.insert(id, previous),
                None => db.annotations.remove(&id),
            };
        });
        Ok(())
    }

    fn remove_annotation(
        &mut self,
        id: AnnotationId,
    ) -> Result<Option<AnnotationRecord>, OntoError> {
        let removed = self.db.annotations.remove(&id);
        if let Some(record) = removed.clone() {
            self.record(move |db| {
                db.annotations.insert(id, record);
            });
        }
        Ok(removed)
    }

    fn read_closure_rows(&self, annotation: AnnotationId) -> Option<&Projection> {
        self.db.projections.get(&annotation)
    }

    fn write_closure_rows(&mut self, projection: Projection) -> Result<(), OntoError> {
        self.db.check_failpoint(FAILPOINT_CLOSURE_WRITE)?;
        let annotation = projection.annotation;
        if self.db.projections.contains_key(&annotation) {
            return Err(OntoError::AlreadyProjected(annotation));
        }
        self.db.projections.insert(annotation, projection);
        self.record(move |db| {
            db.projections.remove(&annotation);
        });
        Ok(())
    }

    fn delete_closure_rows(
        &mut self,
        annotation: AnnotationId,
    ) -> Result<Option<Projection>, OntoError> {
        self.db.check_failpoint(FAILPOINT_CLOSURE_DELETE)?;
        let removed = self.db.projections.remove(&annotation);
        if let Some(projection) = removed.clone() {
            self.record(move |db| {
                db.projections.insert(annotation, projection);
            });
        }
        Ok(removed)
    }

    fn read_ledger(&self, term: TermId) -> LedgerEntry {
        self.db.ledger.entry(term)
    }

    fn apply_ledger_delta(&mut self, delta: LedgerDelta) -> Result<(), OntoError> {
        self.db.check_failpoint(FAILPOINT_LEDGER_APPLY)?;
        self.db.ledger.apply(delta)?;
        self.record(move |db| {
            if let Err(err) = db.ledger.apply(delta.inverse()) {
                warn!(%err, "failed to undo ledger delta during rollback");
            }
        });
        Ok(())
    }

    fn apply_pair_delta(&mut self, delta: PairDelta) -> Result<(), OntoError> {
        self.db.check_failpoint(FAILPOINT_PAIRS_APPLY)?;
        self.db.ledger.apply_pair(&delta)?;
        let inverse = delta.inverse();
        self.record(move |db| {
            if let Err(err) = db.ledger.apply_pair(&inverse) {
                warn!(%err, "failed to undo term pair delta during rollback");
            }
        });
        Ok(())
    }
}

fn remove_from_index(index: &mut HashMap<String, Vec<TermId>>, key: &str, id: TermId) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|candidate| *candidate != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Splits `"name"` or `"name@n"` into the failpoint name and the hit it
/// fires on.
pub fn parse_failpoint(entry: &str) -> Result<(&str, u64), OntoError> {
    let entry = entry.trim();
    let (name, nth) = match entry.split_once('@') {
        Some((name, nth)) => {
            let nth = nth
                .parse::<u64>()
                .ok()
                .filter(|nth| *nth > 0)
                .ok_or_else(|| OntoError::ConfigParse(format!("invalid failpoint hit in {entry}")))?;
            (name, nth)
        }
        None => (entry, 1),
    };
    if name.is_empty() {
        return Err(OntoError::ConfigParse(format!("invalid failpoint {entry}")));
    }
    Ok((name, nth))
}

pub(crate) fn distinct_ids(ids: impl IntoIterator<Item = TermId>) -> Vec<TermId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn uncommitted_transaction_rolls_back() {
        let mut db = Database::new();
        let terms_before = db.term_count();
        {
            let mut tx = db.transaction();
            let feces = tx.insert_term("Feces", None).unwrap();
            let excreta = tx.insert_term("excreta", Some("ENVO:1")).unwrap();
            let envo = tx.ontology_id("envo").unwrap();
            tx.insert_edge(Edge {
                child: feces,
                parent: excreta,
                ontology: envo,
            })
            .unwrap();
            tx.insert_synonym("poop", feces).unwrap();
        }
        assert_eq!(db.term_count(), terms_before);
        assert!(db.find_by_description("feces").is_empty());
        assert!(db.find_by_external_id("envo:1").is_empty());
        assert_eq!(db.get_synonym("poop"), None);
        assert_eq!(db.edges().count(), 0);

        let mut tx = db.transaction();
        let again = tx.insert_term("feces", None).unwrap();
        tx.commit();
        assert_eq!(again, TermId(2));
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut db = Database::new();
        db.with_transaction(|tx| {
            let a = tx.insert_term("a", None)?;
            let b = tx.insert_term("b", None)?;
            let onto = tx.ontology_id("test")?;
            let edge = Edge {
                child: a,
                parent: b,
                ontology: onto,
            };
            assert!(tx.insert_edge(edge)?);
            assert!(!tx.insert_edge(edge)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(db.edges().count(), 1);
    }

    #[test]
    fn failpoint_fires_on_nth_hit() {
        let mut db = Database::new();
        db.set_failpoints(["closure.delete@2"]);
        let mut tx = db.transaction();
        assert!(tx.delete_closure_rows(AnnotationId(1)).is_ok());
        assert_matches!(
            tx.delete_closure_rows(AnnotationId(1)),
            Err(OntoError::TransactionFailure(_))
        );
    }

    #[test]
    fn malformed_failpoints_are_ignored() {
        assert_eq!(parse_failpoint(" pairs.apply@3 ").unwrap(), ("pairs.apply", 3));
        assert_matches!(parse_failpoint("ledger.apply@x"), Err(OntoError::ConfigParse(_)));

        let mut db = Database::new();
        db.set_failpoints(["closure.delete@x"]);
        let mut tx = db.transaction();
        assert!(tx.delete_closure_rows(AnnotationId(1)).is_ok());
    }

    #[test]
    fn snapshot_restores_indices() {
        let mut db = Database::new();
        db.with_transaction(|tx| {
            let a = tx.insert_term("feces", Some("UBERON:0001988"))?;
            let b = tx.insert_term("excreta", None)?;
            let onto = tx.ontology_id("uberon")?;
            tx.insert_edge(Edge {
                child: a,
                parent: b,
                ontology: onto,
            })?;
            tx.insert_synonym("stool", a)?;
            Ok(())
        })
        .unwrap();

        let restored = Database::from_snapshot(db.to_snapshot()).unwrap();
        let feces = restored.find_by_external_id("uberon:0001988");
        assert_eq!(feces.len(), 1);
        assert_eq!(restored.get_synonym("Stool"), Some(feces[0]));
        assert_eq!(restored.get_edges(feces[0]).len(), 1);
        let parent = restored.get_edges(feces[0])[0].parent;
        assert_eq!(restored.get_reverse_edges(parent)[0].child, feces[0]);
    }
}
