use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::closure::ParentCache;
use crate::db::{Database, GraphRead};
use crate::domain::{AnnotationId, LedgerEntry, Polarity, Projection, TermId};
use crate::error::OntoError;
use crate::ledger::{Direction, Ledger};
use crate::projector::compute_projection;

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub annotations: usize,
    pub closure_rows: usize,
    pub terms_touched: usize,
    pub cache_entries: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerDrift {
    pub term: TermId,
    pub expected: LedgerEntry,
    pub actual: LedgerEntry,
}

/// Recomputes every closure row and ledger entry from the stored annotations
/// into shadow tables, validates them, and swaps them in.
#[derive(Debug, Clone, Copy)]
pub struct BulkRebuilder {
    max_pair_terms: usize,
}

impl BulkRebuilder {
    pub fn new(max_pair_terms: usize) -> Self {
        Self { max_pair_terms }
    }

    pub fn run(&self, db: &mut Database) -> Result<RebuildReport, OntoError> {
        let started_at = Utc::now();
        let mut cache = ParentCache::new();
        let mut projections: BTreeMap<AnnotationId, Projection> = BTreeMap::new();
        let mut ledger = Ledger::new();

        for record in db.annotations() {
            let projection = compute_projection(&*db, record, &mut cache, self.max_pair_terms);
            ledger.apply_projection(&projection, Direction::Apply)?;
            projections.insert(record.id, projection);
        }

        let annotations = db.annotations().count();
        validate(db, &projections, &ledger)?;

        let closure_rows = projections.values().map(|p| p.rows.len()).sum();
        let terms_touched = ledger.len();
        let (previous, _) = db.swap_materialized(projections, ledger);
        db.reindex();

        let report = RebuildReport {
            annotations,
            closure_rows,
            terms_touched,
            cache_entries: cache.len(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            annotations,
            closure_rows,
            terms_touched,
            replaced = previous.len(),
            cache_hits = cache.hits(),
            "rebuilt closure rows and ledger"
        );
        Ok(report)
    }
}

/// Checks the shadow tables against the stored annotations and against
/// per-term tallies taken straight from the closure rows.
fn validate(
    db: &Database,
    projections: &BTreeMap<AnnotationId, Projection>,
    ledger: &Ledger,
) -> Result<(), OntoError> {
    for record in db.annotations() {
        let Some(projection) = projections.get(&record.id) else {
            return Err(OntoError::RebuildValidation(format!(
                "annotation {} has no projection",
                record.id
            )));
        };
        if projection.experiment != record.experiment || projection.seq_count != record.seq_count {
            return Err(OntoError::RebuildValidation(format!(
                "projection of annotation {} disagrees with its record",
                record.id
            )));
        }
        let rows: BTreeSet<(Polarity, TermId)> = projection
            .rows
            .iter()
            .map(|row| (row.polarity, row.ancestor))
            .collect();
        if rows.len() != projection.rows.len()
            || projection.rows.iter().any(|row| row.annotation != record.id)
        {
            return Err(OntoError::RebuildValidation(format!(
                "annotation {} has malformed closure rows",
                record.id
            )));
        }
        if let Some(detail) = record
            .details
            .iter()
            .filter(|detail| db.term(detail.term).is_some())
            .find(|detail| !rows.contains(&(detail.polarity, detail.term)))
        {
            return Err(OntoError::RebuildValidation(format!(
                "annotation {} is missing its own term {}",
                record.id, detail.term
            )));
        }
    }
    if projections.len() != db.annotations().count() {
        return Err(OntoError::RebuildValidation(format!(
            "{} projections for {} annotations",
            projections.len(),
            db.annotations().count()
        )));
    }

    let mut tallies: BTreeMap<TermId, (u64, u64, u64)> = BTreeMap::new();
    let mut pairs: BTreeMap<&str, u64> = BTreeMap::new();
    for projection in projections.values() {
        for row in &projection.rows {
            let (seq_count, positive, negative) = tallies.entry(row.ancestor).or_default();
            *seq_count += projection.seq_count;
            match row.polarity {
                Polarity::Low => *negative += 1,
                Polarity::High | Polarity::All => *positive += 1,
            }
        }
        for key in &projection.term_pairs {
            *pairs.entry(key.as_str()).or_default() += 1;
        }
    }
    if ledger.len() != tallies.len() {
        return Err(OntoError::RebuildValidation(format!(
            "ledger has {} terms, closure rows touch {}",
            ledger.len(),
            tallies.len()
        )));
    }
    for (term, (seq_count, positive, negative)) in tallies {
        let entry = ledger.entry(term);
        if (entry.seq_count, entry.annotation_count, entry.annotation_neg_count)
            != (seq_count, positive, negative)
        {
            return Err(OntoError::RebuildValidation(format!(
                "ledger entry for term {term} does not match its closure rows"
            )));
        }
    }
    for (key, count) in pairs {
        if ledger.pair(key).map(|row| row.annotation_count) != Some(count) {
            return Err(OntoError::RebuildValidation(format!(
                "pair {key} does not match its annotations"
            )));
        }
    }
    Ok(())
}

/// The ledger the given projections imply.
pub fn ledger_from_projections<'a, I>(projections: I) -> Result<Ledger, OntoError>
where
    I: IntoIterator<Item = &'a Projection>,
{
    let mut ledger = Ledger::new();
    for projection in projections {
        ledger.apply_projection(projection, Direction::Apply)?;
    }
    Ok(ledger)
}

/// Terms whose live ledger entry differs from what the stored closure rows
/// imply. Nothing is modified.
pub fn verify_ledger(db: &Database) -> Result<Vec<LedgerDrift>, OntoError> {
    let expected = ledger_from_projections(db.projections())?;
    let actual = db.ledger();
    let terms: BTreeSet<TermId> = expected.terms().chain(actual.terms()).collect();

    let drift: Vec<LedgerDrift> = terms
        .into_iter()
        .filter_map(|term| {
            let expected = expected.entry(term);
            let actual = actual.entry(term);
            (expected != actual).then_some(LedgerDrift {
                term,
                expected,
                actual,
            })
        })
        .collect();
    if !drift.is_empty() {
        warn!(terms = drift.len(), "ledger drift detected");
    }
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::db::OntologyWrite;
    use crate::domain::{AnnotationDetail, AnnotationRecord, Edge, ExperimentId};
    use crate::ledger::LedgerDelta;

    fn annotated_db() -> Database {
        let mut db = Database::new();
        db.with_transaction(|tx| {
            let ontology = tx.ontology_id("envo")?;
            let feces = tx.insert_term("feces", None)?;
            let excreta = tx.insert_term("excreta", None)?;
            tx.insert_edge(Edge {
                child: feces,
                parent: excreta,
                ontology,
            })?;
            tx.put_annotation(AnnotationRecord {
                id: AnnotationId(1),
                experiment: ExperimentId(1),
                seq_count: 3,
                details: vec![AnnotationDetail {
                    polarity: Polarity::High,
                    term: feces,
                }],
            })
        })
        .unwrap();
        db
    }

    fn shadow(db: &Database) -> (BTreeMap<AnnotationId, Projection>, Ledger) {
        let mut cache = ParentCache::new();
        let projections: BTreeMap<AnnotationId, Projection> = db
            .annotations()
            .map(|record| (record.id, compute_projection(db, record, &mut cache, 20)))
            .collect();
        let ledger = ledger_from_projections(projections.values()).unwrap();
        (projections, ledger)
    }

    #[test]
    fn consistent_shadow_passes() {
        let db = annotated_db();
        let (projections, ledger) = shadow(&db);
        assert!(validate(&db, &projections, &ledger).is_ok());
    }

    #[test]
    fn shadow_ledger_drift_is_rejected() {
        let db = annotated_db();
        let (projections, mut ledger) = shadow(&db);
        let excreta = db.find_by_description("excreta")[0];
        ledger
            .apply(LedgerDelta {
                term: excreta,
                polarity: Polarity::High,
                seq_count: 1,
                experiment: ExperimentId(1),
                direction: Direction::Apply,
            })
            .unwrap();
        assert_matches!(
            validate(&db, &projections, &ledger),
            Err(OntoError::RebuildValidation(_))
        );
    }

    #[test]
    fn projection_missing_its_term_is_rejected() {
        let db = annotated_db();
        let (mut projections, _) = shadow(&db);
        let feces = db.find_by_description("feces")[0];
        if let Some(projection) = projections.get_mut(&AnnotationId(1)) {
            projection.rows.retain(|row| row.ancestor != feces);
        }
        let ledger = ledger_from_projections(projections.values()).unwrap();
        assert_matches!(
            validate(&db, &projections, &ledger),
            Err(OntoError::RebuildValidation(_))
        );
    }
}
