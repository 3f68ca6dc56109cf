use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use onto_ledger::app::App;
use onto_ledger::config::ResolvedConfig;
use onto_ledger::db::{Database, GraphRead};
use onto_ledger::error::OntoError;
use onto_ledger::import::parse_obo;

const ENVO_SAMPLE: &str = r#"format-version: 1.2
ontology: envo

[Term]
id: ENVO:00002003
name: feces
synonym: "stool" EXACT []
synonym: "faeces" RELATED [ENVO:curator]
is_a: ENVO:02000022 ! excreta

[Term]
id: ENVO:02000022
name: excreta {comment="x"}
relationship: part_of ENVO:01000254 ! environmental material
relationship: has_part ENVO:00000001

[Term]
id: ENVO:01000254
name: environmental material

[Term]
id: ENVO:09999999
name: obsolete thing
is_a: ENVO:00002003
is_obsolete: true

[Typedef]
id: part_of
name: part of
"#;

fn app() -> App {
    App::new(
        Database::new(),
        ResolvedConfig::with_data_dir(Utf8PathBuf::from("target/onto-ledger-test")),
    )
}

#[test]
fn imports_terms_edges_and_synonyms() {
    let mut app = app();
    let report = app
        .import_obo_reader(ENVO_SAMPLE.as_bytes(), "envo")
        .unwrap();

    assert_eq!(report.terms, 3);
    assert_eq!(report.obsolete, 1);
    assert_eq!(report.synonyms, 2);
    assert_eq!(report.edges, 3);
    assert_eq!(report.skipped_stanzas, 1);

    let parents = app.get_parents_as_names_and_ids("faeces").unwrap();
    assert_eq!(parents.names, vec!["excreta", "environmental material"]);
    assert_eq!(parents.external_ids, vec!["envo:02000022", "envo:01000254"]);
    assert!(app.db().find_by_description("obsolete thing").is_empty());

    let material = app.db().find_by_external_id("ENVO:01000254")[0];
    assert_eq!(app.db().get_edges(material)[0].parent, app.db().root());
}

#[test]
fn reimport_is_idempotent() {
    let mut app = app();
    app.import_obo_reader(ENVO_SAMPLE.as_bytes(), "envo")
        .unwrap();
    let terms = app.db().term_count();
    let report = app
        .import_obo_reader(ENVO_SAMPLE.as_bytes(), "envo")
        .unwrap();
    assert_eq!(report.edges, 0);
    assert_eq!(report.synonyms, 0);
    assert_eq!(app.db().term_count(), terms);
}

#[test]
fn reads_gzipped_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("envo.obo.gz")).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(ENVO_SAMPLE.as_bytes()).unwrap();
    std::fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

    let mut app = app();
    let report = app.import_obo(&path, "envo").unwrap();
    assert_eq!(report.terms, 3);
}

#[test]
fn malformed_lines_fail_and_roll_back() {
    let mut app = app();
    let broken = "[Term]\nid: ENVO:1\nname: feces\nthis line has no tag\n";
    assert_matches!(
        app.import_obo_reader(broken.as_bytes(), "envo"),
        Err(OntoError::OboParse { line: 4, .. })
    );
    assert_eq!(app.db().term_count(), 1);

    let document = parse_obo("[Term]\nname: nameless\n".as_bytes());
    assert_matches!(document, Err(OntoError::OboParse { .. }));
}
