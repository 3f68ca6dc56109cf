use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use onto_ledger::app::{AnnotationInput, App, DetailInput};
use onto_ledger::config::ResolvedConfig;
use onto_ledger::db::GraphRead;
use onto_ledger::domain::{ExperimentId, Polarity};
use onto_ledger::error::OntoError;
use onto_ledger::store::Store;
use onto_ledger::terms::NewTerm;

#[test]
fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let config = ResolvedConfig::with_data_dir(data_dir.clone());

    let mut app = App::open(config.clone()).unwrap();
    app.add_term(&NewTerm {
        description: "feces".to_string(),
        parent: Some("excreta".to_string()),
        ontology: "envo".to_string(),
        synonyms: vec!["stool".to_string()],
        ..NewTerm::default()
    })
    .unwrap();
    app.create_annotation(&AnnotationInput {
        experiment: ExperimentId(3),
        seq_count: 8,
        details: vec![DetailInput {
            polarity: Polarity::Low,
            term: "stool".to_string(),
        }],
    })
    .unwrap();
    app.save().unwrap();
    assert!(Store::new(data_dir.clone()).exists());

    let reopened = App::open(config).unwrap();
    assert_eq!(reopened.db().ledger(), app.db().ledger());
    assert_eq!(reopened.db().term_count(), app.db().term_count());
    assert_eq!(reopened.db().projections().count(), 1);
    assert!(reopened.verify().unwrap().consistent);

    let feces = reopened.db().find_by_description("feces")[0];
    assert_eq!(reopened.db().get_synonym("stool"), Some(feces));
    assert_eq!(reopened.ledger_entry(feces).annotation_neg_count, 1);
}

#[test]
fn missing_snapshot_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(dir.path().join("nested")).unwrap());
    let db = store.load().unwrap();
    assert_eq!(db.term_count(), 1);
    assert!(db.ledger().is_empty());
    assert!(!store.exists());
}

#[test]
fn corrupt_snapshot_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
    std::fs::write(store.snapshot_path().as_std_path(), "{ not json").unwrap();
    assert_matches!(store.load(), Err(OntoError::Snapshot(_)));
}
