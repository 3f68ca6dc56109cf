use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{ExperimentId, LedgerEntry, Polarity, Projection, TermId};
use crate::error::OntoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Revert,
}

impl Direction {
    pub fn inverse(self) -> Self {
        match self {
            Direction::Apply => Direction::Revert,
            Direction::Revert => Direction::Apply,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerDelta {
    pub term: TermId,
    pub polarity: Polarity,
    pub seq_count: u64,
    pub experiment: ExperimentId,
    pub direction: Direction,
}

impl LedgerDelta {
    pub fn inverse(self) -> Self {
        Self {
            direction: self.direction.inverse(),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairDelta {
    pub key: String,
    pub experiment: ExperimentId,
    pub direction: Direction,
}

impl PairDelta {
    pub fn inverse(&self) -> Self {
        Self {
            key: self.key.clone(),
            experiment: self.experiment,
            direction: self.direction.inverse(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub seq_count: u64,
    pub annotation_count: u64,
    pub annotation_neg_count: u64,
    #[serde(default)]
    pub positive_experiments: BTreeMap<ExperimentId, u64>,
    #[serde(default)]
    pub negative_experiments: BTreeMap<ExperimentId, u64>,
}

impl LedgerRow {
    pub fn experiments(&self) -> BTreeSet<ExperimentId> {
        self.positive_experiments
            .keys()
            .chain(self.negative_experiments.keys())
            .copied()
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.seq_count == 0
            && self.annotation_count == 0
            && self.annotation_neg_count == 0
            && self.positive_experiments.is_empty()
            && self.negative_experiments.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRow {
    pub annotation_count: u64,
    #[serde(default)]
    pub experiments: BTreeMap<ExperimentId, u64>,
}

/// Per-term counters derived from closure rows, plus the term-pair counters.
///
/// Rows that drop back to zero are removed, so a ledger that had a
/// projection applied and reverted compares equal to one that never saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    rows: BTreeMap<TermId, LedgerRow>,
    #[serde(default)]
    pairs: BTreeMap<String, PairRow>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, term: TermId) -> Option<&LedgerRow> {
        self.rows.get(&term)
    }

    pub fn pair(&self, key: &str) -> Option<&PairRow> {
        self.pairs.get(key)
    }

    pub fn entry(&self, term: TermId) -> LedgerEntry {
        match self.rows.get(&term) {
            Some(row) => LedgerEntry {
                term,
                seq_count: row.seq_count,
                annotation_count: row.annotation_count,
                annotation_neg_count: row.annotation_neg_count,
                experiment_count: row.experiments().len() as u64,
            },
            None => LedgerEntry::empty(term),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = TermId> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.pairs.is_empty()
    }

    pub fn apply(&mut self, delta: LedgerDelta) -> Result<(), OntoError> {
        match delta.direction {
            Direction::Apply => {
                let row = self.rows.entry(delta.term).or_default();
                row.seq_count += delta.seq_count;
                if delta.polarity.is_negative() {
                    row.annotation_neg_count += 1;
                    *row.negative_experiments.entry(delta.experiment).or_insert(0) += 1;
                } else {
                    row.annotation_count += 1;
                    *row.positive_experiments.entry(delta.experiment).or_insert(0) += 1;
                }
                Ok(())
            }
            Direction::Revert => {
                let current = self.rows.get(&delta.term).cloned().unwrap_or_default();
                check_sub(delta.term, "seq_count", current.seq_count, delta.seq_count)?;
                let (field, count, tallies) = if delta.polarity.is_negative() {
                    (
                        "annotation_neg_count",
                        current.annotation_neg_count,
                        &current.negative_experiments,
                    )
                } else {
                    (
                        "annotation_count",
                        current.annotation_count,
                        &current.positive_experiments,
                    )
                };
                check_sub(delta.term, field, count, 1)?;
                let tally = tallies.get(&delta.experiment).copied().unwrap_or(0);
                check_sub(delta.term, "experiment_count", tally, 1)?;

                let row = self.rows.entry(delta.term).or_default();
                row.seq_count -= delta.seq_count;
                let tallies = if delta.polarity.is_negative() {
                    row.annotation_neg_count -= 1;
                    &mut row.negative_experiments
                } else {
                    row.annotation_count -= 1;
                    &mut row.positive_experiments
                };
                decrement_tally(tallies, delta.experiment);
                if row.is_empty() {
                    self.rows.remove(&delta.term);
                }
                Ok(())
            }
        }
    }

    pub fn apply_pair(&mut self, delta: &PairDelta) -> Result<(), OntoError> {
        match delta.direction {
            Direction::Apply => {
                let row = self.pairs.entry(delta.key.clone()).or_default();
                row.annotation_count += 1;
                *row.experiments.entry(delta.experiment).or_insert(0) += 1;
                Ok(())
            }
            Direction::Revert => {
                let Some(row) = self.pairs.get_mut(&delta.key) else {
                    return Err(OntoError::PairLedgerInconsistency(format!(
                        "{} has no ledger row",
                        delta.key
                    )));
                };
                let tally = row.experiments.get(&delta.experiment).copied().unwrap_or(0);
                if row.annotation_count == 0 || tally == 0 {
                    return Err(OntoError::PairLedgerInconsistency(format!(
                        "{} count would drop below zero",
                        delta.key
                    )));
                }
                row.annotation_count -= 1;
                decrement_tally(&mut row.experiments, delta.experiment);
                if row.annotation_count == 0 && row.experiments.is_empty() {
                    self.pairs.remove(&delta.key);
                }
                Ok(())
            }
        }
    }

    /// Applies or reverts every row and pair of a projection directly, without
    /// journaling. Used for shadow ledgers that are not yet live.
    pub fn apply_projection(
        &mut self,
        projection: &Projection,
        direction: Direction,
    ) -> Result<(), OntoError> {
        for delta in projection_deltas(projection, direction) {
            self.apply(delta)?;
        }
        for delta in pair_deltas(projection, direction) {
            self.apply_pair(&delta)?;
        }
        Ok(())
    }
}

pub fn projection_deltas(
    projection: &Projection,
    direction: Direction,
) -> impl Iterator<Item = LedgerDelta> + '_ {
    projection.rows.iter().map(move |row| LedgerDelta {
        term: row.ancestor,
        polarity: row.polarity,
        seq_count: projection.seq_count,
        experiment: projection.experiment,
        direction,
    })
}

pub fn pair_deltas(
    projection: &Projection,
    direction: Direction,
) -> impl Iterator<Item = PairDelta> + '_ {
    projection.term_pairs.iter().map(move |key| PairDelta {
        key: key.clone(),
        experiment: projection.experiment,
        direction,
    })
}

fn check_sub(term: TermId, field: &'static str, current: u64, delta: u64) -> Result<(), OntoError> {
    if current < delta {
        return Err(OntoError::LedgerInconsistency {
            term,
            field,
            current,
            delta,
        });
    }
    Ok(())
}

fn decrement_tally(tallies: &mut BTreeMap<ExperimentId, u64>, experiment: ExperimentId) {
    if let Some(count) = tallies.get_mut(&experiment) {
        *count -= 1;
        if *count == 0 {
            tallies.remove(&experiment);
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn delta(term: u64, polarity: Polarity, experiment: u64, direction: Direction) -> LedgerDelta {
        LedgerDelta {
            term: TermId(term),
            polarity,
            seq_count: 4,
            experiment: ExperimentId(experiment),
            direction,
        }
    }

    #[test]
    fn experiment_count_is_distinct() {
        let mut ledger = Ledger::new();
        ledger.apply(delta(7, Polarity::All, 1, Direction::Apply)).unwrap();
        ledger.apply(delta(7, Polarity::High, 1, Direction::Apply)).unwrap();
        ledger.apply(delta(7, Polarity::Low, 2, Direction::Apply)).unwrap();

        let entry = ledger.entry(TermId(7));
        assert_eq!(entry.seq_count, 12);
        assert_eq!(entry.annotation_count, 2);
        assert_eq!(entry.annotation_neg_count, 1);
        assert_eq!(entry.experiment_count, 2);
    }

    #[test]
    fn revert_removes_empty_rows() {
        let mut ledger = Ledger::new();
        let add = delta(3, Polarity::Low, 9, Direction::Apply);
        ledger.apply(add).unwrap();
        ledger.apply(add.inverse()).unwrap();
        assert_eq!(ledger, Ledger::new());
    }

    #[test]
    fn revert_below_zero_is_rejected_without_mutation() {
        let mut ledger = Ledger::new();
        ledger.apply(delta(3, Polarity::All, 1, Direction::Apply)).unwrap();
        let before = ledger.clone();

        let err = ledger
            .apply(delta(3, Polarity::Low, 1, Direction::Revert))
            .unwrap_err();
        assert_matches!(
            err,
            OntoError::LedgerInconsistency {
                field: "annotation_neg_count",
                ..
            }
        );
        assert_eq!(ledger, before);
    }
}
