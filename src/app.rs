use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::closure::{ParentCache, ParentClosureResolver};
use crate::config::ResolvedConfig;
use crate::db::{Database, OntologyWrite};
use crate::domain::{
    AnnotationDetail, AnnotationId, AnnotationRecord, ExperimentId, LedgerEntry, Polarity,
    Projection, Relation, TermId,
};
use crate::error::OntoError;
use crate::family::{FamilyGraphBuilder, FamilyReport};
use crate::import::{self, ImportReport};
use crate::projector::AnnotationTermProjector;
use crate::rebuild::{self, BulkRebuilder, LedgerDrift, RebuildReport};
use crate::stats::{self, TermCounts};
use crate::store::Store;
use crate::terms::{self, AddedTerm, NewTerm};
use crate::tree::TreeEnumerator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailInput {
    #[serde(with = "polarity_tag")]
    pub polarity: Polarity,
    pub term: String,
}

/// Annotation files spell polarity as a tag (`"high"`, `"lower in"`).
mod polarity_tag {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::domain::Polarity;

    pub fn serialize<S: Serializer>(polarity: &Polarity, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(polarity)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Polarity, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationInput {
    pub experiment: ExperimentId,
    pub seq_count: u64,
    pub details: Vec<DetailInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationResult {
    pub annotation: AnnotationId,
    pub experiment: ExperimentId,
    pub closure_rows: usize,
    pub term_pairs: usize,
}

impl AnnotationResult {
    fn from_projection(projection: &Projection) -> Self {
        Self {
            annotation: projection.annotation,
            experiment: projection.experiment,
            closure_rows: projection.rows.len(),
            term_pairs: projection.term_pairs.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParentsResult {
    pub term: String,
    pub names: Vec<String>,
    pub external_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainsResult {
    pub term: String,
    pub chains: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub consistent: bool,
    pub drift: Vec<LedgerDrift>,
}

pub struct App {
    db: Database,
    config: ResolvedConfig,
    store: Option<Store>,
}

impl App {
    pub fn new(mut db: Database, config: ResolvedConfig) -> Self {
        db.set_failpoints(&config.failpoints);
        Self {
            db,
            config,
            store: None,
        }
    }

    /// Loads the snapshot under `config.data_dir`.
    pub fn open(config: ResolvedConfig) -> Result<Self, OntoError> {
        let store = Store::new(config.data_dir.clone());
        let db = store.load()?;
        let mut app = Self::new(db, config);
        app.store = Some(store);
        Ok(app)
    }

    pub fn save(&self) -> Result<(), OntoError> {
        match &self.store {
            Some(store) => store.save(&self.db),
            None => Ok(()),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn projector(&self) -> AnnotationTermProjector {
        AnnotationTermProjector::new(self.config.max_pair_terms)
    }

    pub fn add_term(&mut self, new_term: &NewTerm) -> Result<AddedTerm, OntoError> {
        self.db.with_transaction(|tx| terms::add_term(tx, new_term))
    }

    pub fn get_or_create_term(
        &mut self,
        description: &str,
        external_id: Option<&str>,
    ) -> Result<TermId, OntoError> {
        self.db
            .with_transaction(|tx| terms::get_or_create_term(tx, description, external_id))
    }

    pub fn add_synonym(&mut self, term: &str, alias: &str) -> Result<bool, OntoError> {
        let ids = ParentClosureResolver::new(&self.db).resolve_term(term, true)?;
        let canonical = ids
            .first()
            .copied()
            .ok_or_else(|| OntoError::NotFound(format!("term {term}")))?;
        self.db
            .with_transaction(|tx| terms::add_synonym(tx, canonical, alias))
    }

    pub fn create_annotation(
        &mut self,
        input: &AnnotationInput,
    ) -> Result<AnnotationResult, OntoError> {
        let projector = self.projector();
        let projection = self.db.with_transaction(|tx| {
            let details = resolve_details(tx, &input.details)?;
            let record = AnnotationRecord {
                id: tx.allocate_annotation_id(),
                experiment: input.experiment,
                seq_count: input.seq_count,
                details,
            };
            tx.put_annotation(record.clone())?;
            projector.project_and_apply(tx, &record, &mut ParentCache::new())
        })?;
        info!(annotation = %projection.annotation, "created annotation");
        Ok(AnnotationResult::from_projection(&projection))
    }

    pub fn update_annotation(
        &mut self,
        id: AnnotationId,
        input: &AnnotationInput,
    ) -> Result<AnnotationResult, OntoError> {
        let projector = self.projector();
        let projection = self.db.with_transaction(|tx| {
            if tx.annotation(id).is_none() {
                return Err(OntoError::NotFound(format!("annotation {id}")));
            }
            let details = resolve_details(tx, &input.details)?;
            let record = AnnotationRecord {
                id,
                experiment: input.experiment,
                seq_count: input.seq_count,
                details,
            };
            let mut cache = ParentCache::new();
            let projection = if tx.read_closure_rows(id).is_some() {
                projector.update(tx, &record, &mut cache)?
            } else {
                projector.project_and_apply(tx, &record, &mut cache)?
            };
            tx.put_annotation(record)?;
            Ok(projection)
        })?;
        info!(annotation = %id, "updated annotation");
        Ok(AnnotationResult::from_projection(&projection))
    }

    pub fn delete_annotation(&mut self, id: AnnotationId) -> Result<AnnotationResult, OntoError> {
        let projector = self.projector();
        let result = self.db.with_transaction(|tx| {
            let Some(record) = tx.annotation(id).cloned() else {
                return Err(OntoError::NotFound(format!("annotation {id}")));
            };
            let result = if tx.read_closure_rows(id).is_some() {
                AnnotationResult::from_projection(&projector.retract(tx, id)?)
            } else {
                AnnotationResult {
                    annotation: id,
                    experiment: record.experiment,
                    closure_rows: 0,
                    term_pairs: 0,
                }
            };
            tx.remove_annotation(id)?;
            Ok(result)
        })?;
        info!(annotation = %id, "deleted annotation");
        Ok(result)
    }

    /// Stores `record` and projects it. The record keeps its id.
    pub fn project_and_apply(&mut self, record: &AnnotationRecord) -> Result<Projection, OntoError> {
        let projector = self.projector();
        self.db.with_transaction(|tx| {
            let projection = projector.project_and_apply(tx, record, &mut ParentCache::new())?;
            tx.put_annotation(record.clone())?;
            Ok(projection)
        })
    }

    pub fn retract(&mut self, id: AnnotationId) -> Result<Projection, OntoError> {
        let projector = self.projector();
        self.db.with_transaction(|tx| projector.retract(tx, id))
    }

    pub fn update(&mut self, record: &AnnotationRecord) -> Result<Projection, OntoError> {
        let projector = self.projector();
        self.db.with_transaction(|tx| {
            let projection = projector.update(tx, record, &mut ParentCache::new())?;
            tx.put_annotation(record.clone())?;
            Ok(projection)
        })
    }

    pub fn get_parents(&self, term: &str) -> Result<BTreeSet<TermId>, OntoError> {
        ParentClosureResolver::new(&self.db).get_parents(term, self.config.force_unique)
    }

    pub fn get_parents_as_names_and_ids(&self, term: &str) -> Result<ParentsResult, OntoError> {
        let (names, external_ids) = ParentClosureResolver::new(&self.db)
            .get_parents_as_names_and_ids(term, self.config.force_unique)?;
        Ok(ParentsResult {
            term: term.to_string(),
            names,
            external_ids,
        })
    }

    pub fn enumerate_maximal_chains(&self, term: &str) -> Result<ChainsResult, OntoError> {
        let chains = TreeEnumerator::new(self.config.max_chains).enumerate_names(
            &self.db,
            term,
            self.config.force_unique,
        )?;
        Ok(ChainsResult {
            term: term.to_string(),
            chains,
        })
    }

    pub fn build_family(
        &self,
        terms: &[String],
        relation: Relation,
    ) -> Result<FamilyReport, OntoError> {
        FamilyGraphBuilder::new(self.config.max_children, self.config.force_unique).build(
            &self.db,
            terms,
            relation,
        )
    }

    pub fn term_counts(&self, keys: &[String]) -> BTreeMap<String, TermCounts> {
        stats::term_counts(&self.db, self.db.ledger(), keys)
    }

    pub fn ledger_entry(&self, term: TermId) -> LedgerEntry {
        self.db.ledger().entry(term)
    }

    pub fn rebuild(&mut self) -> Result<RebuildReport, OntoError> {
        BulkRebuilder::new(self.config.max_pair_terms).run(&mut self.db)
    }

    pub fn verify(&self) -> Result<CheckResult, OntoError> {
        let drift = rebuild::verify_ledger(&self.db)?;
        Ok(CheckResult {
            consistent: drift.is_empty(),
            drift,
        })
    }

    pub fn import_obo(&mut self, path: &Utf8Path, ontology: &str) -> Result<ImportReport, OntoError> {
        let reader = import::open_obo(path)?;
        self.import_obo_reader(reader, ontology)
    }

    pub fn import_obo_reader<R: BufRead>(
        &mut self,
        reader: R,
        ontology: &str,
    ) -> Result<ImportReport, OntoError> {
        let document = import::parse_obo(reader)?;
        self.db
            .with_transaction(|tx| import::import_obo(tx, &document, ontology))
    }
}

/// Detail names to ids. Unknown names become new terms; names matching
/// several terms use the first match.
fn resolve_details<W: OntologyWrite + ?Sized>(
    store: &mut W,
    details: &[DetailInput],
) -> Result<Vec<AnnotationDetail>, OntoError> {
    details
        .iter()
        .map(|detail| {
            let ids = terms::resolve_with_synonyms(&*store, &detail.term);
            let term = match ids.as_slice() {
                [] => {
                    info!(term = %detail.term, "creating term for annotation detail");
                    terms::get_or_create_term(store, &detail.term, None)?
                }
                [id] => *id,
                [first, ..] => {
                    warn!(term = %detail.term, matches = ids.len(), "ambiguous detail term; using first match");
                    *first
                }
            };
            Ok(AnnotationDetail {
                polarity: detail.polarity,
                term,
            })
        })
        .collect()
}
