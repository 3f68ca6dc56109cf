use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, warn};

use crate::closure::{ParentCache, closure_cached};
use crate::db::{GraphRead, OntologyWrite};
use crate::domain::{AnnotationId, AnnotationRecord, ClosureRow, Polarity, Projection, TermId};
use crate::error::OntoError;
use crate::ledger::{Direction, pair_deltas, projection_deltas};

/// Closure rows and term pairs one annotation contributes to the ledger.
///
/// Details naming terms missing from the graph are skipped. Term pairs are
/// only produced when the annotation has at most `max_pair_terms` details.
pub fn compute_projection<G: GraphRead + ?Sized>(
    graph: &G,
    record: &AnnotationRecord,
    cache: &mut ParentCache,
    max_pair_terms: usize,
) -> Projection {
    let mut by_polarity: BTreeMap<Polarity, BTreeSet<TermId>> = BTreeMap::new();
    let mut labels = Vec::with_capacity(record.details.len());

    for detail in &record.details {
        let Some(term) = graph.term(detail.term) else {
            warn!(annotation = %record.id, term = %detail.term, "skipping detail with unknown term");
            continue;
        };
        let label = if detail.polarity.is_negative() {
            format!("-{}", term.description)
        } else {
            term.description.clone()
        };
        labels.push(label);
        let closure = closure_cached(graph, detail.term, cache);
        by_polarity
            .entry(detail.polarity)
            .or_default()
            .extend(closure.iter().copied());
    }

    let rows = by_polarity
        .into_iter()
        .flat_map(|(polarity, ancestors)| {
            ancestors.into_iter().map(move |ancestor| ClosureRow {
                annotation: record.id,
                polarity,
                ancestor,
            })
        })
        .collect();

    Projection {
        annotation: record.id,
        experiment: record.experiment,
        seq_count: record.seq_count,
        rows,
        term_pairs: term_pairs(&labels, max_pair_terms),
    }
}

/// `a+b` keys for every pair of detail labels, each key sorted alphabetically.
pub fn term_pairs(labels: &[String], max_pair_terms: usize) -> Vec<String> {
    if labels.len() > max_pair_terms {
        return Vec::new();
    }
    let mut pairs = BTreeSet::new();
    for (i, first) in labels.iter().enumerate() {
        for second in &labels[i + 1..] {
            if first == second {
                continue;
            }
            let (low, high) = if first <= second {
                (first, second)
            } else {
                (second, first)
            };
            pairs.insert(format!("{low}+{high}"));
        }
    }
    pairs.into_iter().collect()
}

/// Materializes annotation closures and keeps the count ledger in step.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationTermProjector {
    max_pair_terms: usize,
}

impl AnnotationTermProjector {
    pub fn new(max_pair_terms: usize) -> Self {
        Self { max_pair_terms }
    }

    pub fn project_and_apply<W: OntologyWrite + ?Sized>(
        &self,
        store: &mut W,
        record: &AnnotationRecord,
        cache: &mut ParentCache,
    ) -> Result<Projection, OntoError> {
        if store.read_closure_rows(record.id).is_some() {
            return Err(OntoError::AlreadyProjected(record.id));
        }
        let projection = compute_projection(&*store, record, cache, self.max_pair_terms);
        for delta in projection_deltas(&projection, Direction::Apply) {
            store.apply_ledger_delta(delta)?;
        }
        for delta in pair_deltas(&projection, Direction::Apply) {
            store.apply_pair_delta(delta)?;
        }
        store.write_closure_rows(projection.clone())?;
        info!(
            annotation = %record.id,
            rows = projection.rows.len(),
            pairs = projection.term_pairs.len(),
            "projected annotation"
        );
        Ok(projection)
    }

    /// Reverses exactly what the stored projection of `annotation` applied.
    pub fn retract<W: OntologyWrite + ?Sized>(
        &self,
        store: &mut W,
        annotation: AnnotationId,
    ) -> Result<Projection, OntoError> {
        let projection = store
            .read_closure_rows(annotation)
            .cloned()
            .ok_or_else(|| OntoError::NotFound(format!("closure rows for annotation {annotation}")))?;

        for delta in projection_deltas(&projection, Direction::Revert) {
            if let Err(err) = store.apply_ledger_delta(delta) {
                if matches!(err, OntoError::LedgerInconsistency { .. }) {
                    error!(%annotation, %err, "retraction aborted");
                }
                return Err(err);
            }
        }
        for delta in pair_deltas(&projection, Direction::Revert) {
            if let Err(err) = store.apply_pair_delta(delta) {
                if matches!(err, OntoError::PairLedgerInconsistency(_)) {
                    error!(%annotation, %err, "retraction aborted");
                }
                return Err(err);
            }
        }
        store.delete_closure_rows(annotation)?;
        info!(%annotation, rows = projection.rows.len(), "retracted annotation");
        Ok(projection)
    }

    /// Retracts the current projection of `record.id` and projects `record`.
    /// Callers run both halves in one transaction.
    pub fn update<W: OntologyWrite + ?Sized>(
        &self,
        store: &mut W,
        record: &AnnotationRecord,
        cache: &mut ParentCache,
    ) -> Result<Projection, OntoError> {
        self.retract(store, record.id)?;
        debug!(annotation = %record.id, "re-projecting updated annotation");
        self.project_and_apply(store, record, cache)
    }
}
