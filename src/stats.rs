use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::db::GraphRead;
use crate::domain::{ExperimentId, normalize_description};
use crate::ledger::Ledger;
use crate::terms;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TermCounts {
    pub total_annotations: u64,
    pub total_experiments: u64,
}

/// Annotation and experiment totals per key.
///
/// `a+b` keys are term pairs, `-term` reads the `low` side of `term`, and any
/// other key reads the positive side. Keys that match nothing are left out.
pub fn term_counts<G: GraphRead + ?Sized>(
    graph: &G,
    ledger: &Ledger,
    keys: &[String],
) -> BTreeMap<String, TermCounts> {
    let mut counts = BTreeMap::new();
    for key in keys {
        let normalized = normalize_description(key);
        if normalized.contains('+') {
            match ledger.pair(&normalized) {
                Some(row) => {
                    counts.insert(
                        key.clone(),
                        TermCounts {
                            total_annotations: row.annotation_count,
                            total_experiments: row.experiments.len() as u64,
                        },
                    );
                }
                None => debug!(%key, "term pair has no ledger row"),
            }
            continue;
        }

        let (name, negative) = match normalized.strip_prefix('-') {
            Some(name) => (name, true),
            None => (normalized.as_str(), false),
        };
        let ids = terms::resolve_with_synonyms(graph, name);
        if ids.is_empty() {
            debug!(%key, "term not found for counts");
            continue;
        }

        let mut total = TermCounts::default();
        let mut experiments: BTreeSet<ExperimentId> = BTreeSet::new();
        for id in ids {
            let Some(row) = ledger.row(id) else {
                continue;
            };
            if negative {
                total.total_annotations += row.annotation_neg_count;
                experiments.extend(row.negative_experiments.keys().copied());
            } else {
                total.total_annotations += row.annotation_count;
                experiments.extend(row.positive_experiments.keys().copied());
            }
        }
        total.total_experiments = experiments.len() as u64;
        counts.insert(key.clone(), total);
    }
    counts
}
