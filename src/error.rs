use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{AnnotationId, TermId};

#[derive(Debug, Error, Diagnostic)]
pub enum OntoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("term {term} matches {count} ids; supply an external id (e.g. \"envo:00000043\") instead")]
    AmbiguousTerm { term: String, count: usize },

    #[error("cycle detected in term graph at term {term} (reached from {from})")]
    CycleGuardTriggered { term: TermId, from: TermId },

    #[error("ledger inconsistency at term {term}: {field} would drop below zero ({current} - {delta})")]
    #[diagnostic(help("the ledger has drifted from the closure rows; run `onto-ledger rebuild`"))]
    LedgerInconsistency {
        term: TermId,
        field: &'static str,
        current: u64,
        delta: u64,
    },

    #[error("term pair ledger inconsistency: {0}")]
    PairLedgerInconsistency(String),

    #[error("transaction failed: {0}")]
    TransactionFailure(String),

    #[error("annotation {0} already has closure rows")]
    AlreadyProjected(AnnotationId),

    #[error("invalid term: {0}")]
    InvalidTerm(String),

    #[error("invalid polarity: {0}")]
    InvalidPolarity(String),

    #[error("invalid annotation input: {0}")]
    InvalidAnnotation(String),

    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    #[error("rebuild validation failed: {0}")]
    RebuildValidation(String),

    #[error("missing config file onto-ledger.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("OBO parse error at line {line}: {message}")]
    OboParse { line: usize, message: String },

    #[error("snapshot error: {0}")]
    Snapshot(String),
}
