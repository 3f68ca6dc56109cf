use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AnnotationResult, ChainsResult, CheckResult, ParentsResult};
use crate::family::FamilyReport;
use crate::import::ImportReport;
use crate::rebuild::RebuildReport;
use crate::stats::TermCounts;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_parents(result: &ParentsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_chains(result: &ChainsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_family(report: &FamilyReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_annotation(result: &AnnotationResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_counts(counts: &BTreeMap<String, TermCounts>) -> io::Result<()> {
        Self::print_json(counts)
    }

    pub fn print_import(report: &ImportReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_rebuild(report: &RebuildReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
