use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::OntoError;

pub const SYNTHETIC_ID_PREFIX: &str = "local";
pub const ROOT_DESCRIPTION: &str = "na";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub u64);

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OntologyId(pub u32);

impl fmt::Display for OntologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub u64);

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction an annotation asserts for a term.
///
/// Serialized as its numeric code (1 high, 2 low, 3 all); `Low` is the only
/// polarity that feeds the negative annotation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Polarity {
    High,
    Low,
    All,
}

impl Polarity {
    pub fn code(self) -> u8 {
        match self {
            Polarity::High => 1,
            Polarity::Low => 2,
            Polarity::All => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, OntoError> {
        match code {
            1 => Ok(Polarity::High),
            2 => Ok(Polarity::Low),
            3 => Ok(Polarity::All),
            other => Err(OntoError::InvalidPolarity(other.to_string())),
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Polarity::Low)
    }
}

impl From<Polarity> for u8 {
    fn from(polarity: Polarity) -> Self {
        polarity.code()
    }
}

impl TryFrom<u8> for Polarity {
    type Error = OntoError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Polarity::from_code(code)
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::High => write!(f, "high"),
            Polarity::Low => write!(f, "low"),
            Polarity::All => write!(f, "all"),
        }
    }
}

impl FromStr for Polarity {
    type Err = OntoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "high" | "higher in" => Ok(Polarity::High),
            "low" | "lower in" => Ok(Polarity::Low),
            "all" => Ok(Polarity::All),
            _ => Err(OntoError::InvalidPolarity(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Parent,
    Child,
    Both,
}

impl Relation {
    pub fn includes_parents(self) -> bool {
        matches!(self, Relation::Parent | Relation::Both)
    }

    pub fn includes_children(self) -> bool {
        matches!(self, Relation::Child | Relation::Both)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Parent => write!(f, "parent"),
            Relation::Child => write!(f, "child"),
            Relation::Both => write!(f, "both"),
        }
    }
}

impl FromStr for Relation {
    type Err = OntoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "parent" => Ok(Relation::Parent),
            "child" => Ok(Relation::Child),
            "both" => Ok(Relation::Both),
            _ => Err(OntoError::InvalidRelation(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub description: String,
    pub external_id: String,
}

impl Term {
    pub fn has_synthetic_id(&self) -> bool {
        self.external_id == synthetic_external_id(self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub child: TermId,
    pub parent: TermId,
    pub ontology: OntologyId,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Synonym {
    pub alias: String,
    pub canonical: TermId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    pub id: OntologyId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnotationDetail {
    pub polarity: Polarity,
    pub term: TermId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub experiment: ExperimentId,
    pub seq_count: u64,
    pub details: Vec<AnnotationDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClosureRow {
    pub annotation: AnnotationId,
    pub polarity: Polarity,
    pub ancestor: TermId,
}

/// Everything written for one annotation: the closure rows plus the exact
/// sequence count, experiment and term pairs they were applied with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub annotation: AnnotationId,
    pub experiment: ExperimentId,
    pub seq_count: u64,
    pub rows: Vec<ClosureRow>,
    #[serde(default)]
    pub term_pairs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub term: TermId,
    pub seq_count: u64,
    pub annotation_count: u64,
    pub annotation_neg_count: u64,
    pub experiment_count: u64,
}

impl LedgerEntry {
    pub fn empty(term: TermId) -> Self {
        Self {
            term,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.seq_count == 0
            && self.annotation_count == 0
            && self.annotation_neg_count == 0
            && self.experiment_count == 0
    }
}

pub fn normalize_description(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn synthetic_external_id(id: TermId) -> String {
    format!("{SYNTHETIC_ID_PREFIX}:{}", id.0)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn polarity_codes_round_trip() {
        for polarity in [Polarity::High, Polarity::Low, Polarity::All] {
            assert_eq!(Polarity::from_code(polarity.code()).unwrap(), polarity);
        }
        assert_matches!(Polarity::from_code(7), Err(OntoError::InvalidPolarity(_)));
    }

    #[test]
    fn polarity_serializes_as_code() {
        let row = ClosureRow {
            annotation: AnnotationId(4),
            polarity: Polarity::Low,
            ancestor: TermId(9),
        };
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["polarity"], 2);
        let back: ClosureRow = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
        assert!(serde_json::from_str::<Polarity>("5").is_err());
        assert!(serde_json::from_str::<Polarity>("\"low\"").is_err());
    }

    #[test]
    fn empty_ledger_entry_is_zero() {
        let entry = LedgerEntry::empty(TermId(3));
        assert_eq!(entry.term, TermId(3));
        assert_eq!(entry.seq_count, 0);
        assert_eq!(entry.experiment_count, 0);
        assert_eq!(LedgerEntry::default().term, TermId::default());
    }

    #[test]
    fn polarity_parses_tags() {
        assert_eq!("LOW".parse::<Polarity>().unwrap(), Polarity::Low);
        assert_eq!("higher in".parse::<Polarity>().unwrap(), Polarity::High);
        assert!(Polarity::Low.is_negative());
        assert!(!Polarity::All.is_negative());
        assert_matches!("sideways".parse::<Polarity>(), Err(OntoError::InvalidPolarity(_)));
    }

    #[test]
    fn relation_flags() {
        let both: Relation = "both".parse().unwrap();
        assert!(both.includes_parents() && both.includes_children());
        assert!(!Relation::Child.includes_parents());
        assert_matches!("cousin".parse::<Relation>(), Err(OntoError::InvalidRelation(_)));
    }

    #[test]
    fn synthetic_ids() {
        let term = Term {
            id: TermId(12),
            description: "feces".to_string(),
            external_id: synthetic_external_id(TermId(12)),
        };
        assert_eq!(term.external_id, "local:12");
        assert!(term.has_synthetic_id());
        assert_eq!(normalize_description("  Homo Sapiens "), "homo sapiens");
    }
}
