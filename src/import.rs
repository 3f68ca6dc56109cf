use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::OntologyWrite;
use crate::error::OntoError;
use crate::graph;
use crate::terms;

pub const PARENT_RELATIONSHIPS: [&str; 5] = [
    "part_of",
    "derives_from",
    "located_in",
    "develops_from",
    "participates_in",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OboTerm {
    pub id: String,
    pub name: Option<String>,
    pub synonyms: Vec<String>,
    pub parents: Vec<String>,
    pub obsolete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OboDocument {
    pub terms: Vec<OboTerm>,
    pub skipped_stanzas: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub terms: usize,
    pub edges: usize,
    pub synonyms: usize,
    pub obsolete: usize,
    pub skipped_stanzas: usize,
}

/// Opens an `.obo` file, transparently decompressing `.gz`.
pub fn open_obo(path: &Utf8Path) -> Result<Box<dyn BufRead>, OntoError> {
    let file = File::open(path).map_err(|err| OntoError::Filesystem(format!("{path}: {err}")))?;
    if path.extension() == Some("gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn parse_obo<R: BufRead>(reader: R) -> Result<OboDocument, OntoError> {
    let synonym_re = Regex::new(r#"^"((?:[^"\\]|\\.)*)""#).map_err(|err| OntoError::OboParse {
        line: 0,
        message: err.to_string(),
    })?;
    let mut document = OboDocument::default();
    let mut current: Option<OboTerm> = None;
    let mut in_term = false;
    let mut in_stanza = false;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|err| OntoError::Filesystem(err.to_string()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        if line.starts_with('[') {
            if let Some(term) = current.take() {
                finish_term(&mut document, term, line_no)?;
            }
            in_stanza = true;
            in_term = line.eq_ignore_ascii_case("[term]");
            if in_term {
                current = Some(OboTerm::default());
            } else {
                document.skipped_stanzas += 1;
            }
            continue;
        }
        if !in_stanza {
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            return Err(OntoError::OboParse {
                line: line_no,
                message: format!("expected `tag: value`, got {line}"),
            });
        };
        if !in_term {
            continue;
        }
        let Some(term) = current.as_mut() else {
            continue;
        };
        let value = value.trim();
        match tag.trim() {
            "id" => term.id = value.to_string(),
            "name" => term.name = Some(strip_qualifiers(value).to_string()),
            "synonym" => match synonym_re.captures(value) {
                Some(captures) => term.synonyms.push(captures[1].replace("\\\"", "\"")),
                None => warn!(line = line_no, "unparsable synonym line"),
            },
            "is_a" => term.parents.push(strip_comment(value).to_string()),
            "relationship" => {
                if let Some((kind, target)) = value.split_once(' ')
                    && PARENT_RELATIONSHIPS.contains(&kind)
                {
                    term.parents.push(strip_comment(target).to_string());
                }
            }
            "is_obsolete" => term.obsolete = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    if let Some(term) = current.take() {
        finish_term(&mut document, term, 0)?;
    }
    debug!(
        terms = document.terms.len(),
        skipped = document.skipped_stanzas,
        "parsed obo document"
    );
    Ok(document)
}

fn finish_term(document: &mut OboDocument, term: OboTerm, line: usize) -> Result<(), OntoError> {
    if term.id.is_empty() {
        return Err(OntoError::OboParse {
            line,
            message: "[Term] stanza without id".to_string(),
        });
    }
    document.terms.push(term);
    Ok(())
}

fn strip_qualifiers(value: &str) -> &str {
    value.split(" {").next().unwrap_or(value).trim()
}

fn strip_comment(value: &str) -> &str {
    strip_qualifiers(value.split('!').next().unwrap_or(value))
}

/// Loads every non-obsolete term of `document` into `ontology`.
///
/// Terms without parents are attached to the root. Parents that are not
/// defined in the document are created from their external id alone.
pub fn import_obo<W: OntologyWrite + ?Sized>(
    store: &mut W,
    document: &OboDocument,
    ontology: &str,
) -> Result<ImportReport, OntoError> {
    let ontology_id = store.ontology_id(ontology)?;
    let mut report = ImportReport {
        skipped_stanzas: document.skipped_stanzas,
        ..ImportReport::default()
    };
    let mut ids = HashMap::new();

    for term in &document.terms {
        if term.obsolete {
            report.obsolete += 1;
            continue;
        }
        let description = term
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&term.id);
        let id = terms::get_or_create_term(store, description, Some(&term.id))?;
        ids.insert(term.id.to_lowercase(), id);
        report.terms += 1;
        for alias in &term.synonyms {
            if terms::add_synonym(store, id, alias)? {
                report.synonyms += 1;
            }
        }
    }

    for term in document.terms.iter().filter(|term| !term.obsolete) {
        let Some(child) = ids.get(&term.id.to_lowercase()).copied() else {
            continue;
        };
        if term.parents.is_empty() {
            let root = store.root();
            if graph::add_edge(store, child, root, ontology_id)? {
                report.edges += 1;
            }
            continue;
        }
        for parent_id in &term.parents {
            let parent = match ids.get(&parent_id.to_lowercase()) {
                Some(id) => *id,
                None => {
                    debug!(%parent_id, "parent not defined in document");
                    terms::get_or_create_term(store, parent_id, Some(parent_id))?
                }
            };
            if parent == child {
                warn!(term = %term.id, "ignoring self-referencing parent");
                continue;
            }
            if graph::add_edge(store, child, parent, ontology_id)? {
                report.edges += 1;
            }
        }
    }

    info!(
        ontology,
        terms = report.terms,
        edges = report.edges,
        synonyms = report.synonyms,
        "imported obo ontology"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_qualifiers() {
        assert_eq!(strip_comment("ENVO:01000254 ! environmental system"), "ENVO:01000254");
        assert_eq!(strip_comment("UBERON:0000061 {source=\"x\"} ! anatomical structure"), "UBERON:0000061");
        assert_eq!(strip_qualifiers("feces {comment}"), "feces");
    }

    #[test]
    fn parses_relationships_and_synonyms() {
        let obo = "format-version: 1.2\n\n[Term]\nid: UBERON:1\nname: feces\nsynonym: \"stool\" EXACT []\nis_a: UBERON:2 ! excreta\nrelationship: part_of UBERON:3 ! body\nrelationship: has_part UBERON:4\n\n[Typedef]\nid: part_of\n";
        let document = parse_obo(obo.as_bytes()).unwrap();
        assert_eq!(document.terms.len(), 1);
        assert_eq!(document.skipped_stanzas, 1);
        let term = &document.terms[0];
        assert_eq!(term.synonyms, vec!["stool"]);
        assert_eq!(term.parents, vec!["UBERON:2", "UBERON:3"]);
    }
}
