use camino::Utf8PathBuf;

use onto_ledger::app::{AnnotationInput, App, DetailInput};
use onto_ledger::config::ResolvedConfig;
use onto_ledger::db::{Database, GraphRead, OntologyWrite};
use onto_ledger::domain::{ExperimentId, Polarity};
use onto_ledger::ledger::{Direction, LedgerDelta};
use onto_ledger::rebuild::{BulkRebuilder, ledger_from_projections, verify_ledger};
use onto_ledger::terms::NewTerm;

fn graph_app() -> App {
    let mut app = App::new(
        Database::new(),
        ResolvedConfig::with_data_dir(Utf8PathBuf::from("target/onto-ledger-test")),
    );
    for (child, parent, ontology) in [
        ("feces", "excreta", "envo"),
        ("excreta", "exposome", "envo"),
        ("saliva", "bodily fluid", "uberon"),
        ("feces", "bodily fluid", "uberon"),
        ("homo sapiens", "mammalia", "ncbitaxon"),
        ("mus musculus", "mammalia", "ncbitaxon"),
    ] {
        app.add_term(&NewTerm {
            description: child.to_string(),
            parent: Some(parent.to_string()),
            ontology: ontology.to_string(),
            ..NewTerm::default()
        })
        .unwrap();
    }
    app
}

fn annotations() -> Vec<AnnotationInput> {
    let detail = |polarity, term: &str| DetailInput {
        polarity,
        term: term.to_string(),
    };
    vec![
        AnnotationInput {
            experiment: ExperimentId(1),
            seq_count: 5,
            details: vec![
                detail(Polarity::All, "feces"),
                detail(Polarity::All, "homo sapiens"),
            ],
        },
        AnnotationInput {
            experiment: ExperimentId(1),
            seq_count: 2,
            details: vec![
                detail(Polarity::High, "saliva"),
                detail(Polarity::Low, "feces"),
            ],
        },
        AnnotationInput {
            experiment: ExperimentId(2),
            seq_count: 11,
            details: vec![
                detail(Polarity::All, "mus musculus"),
                detail(Polarity::Low, "excreta"),
                detail(Polarity::High, "bodily fluid"),
            ],
        },
    ]
}

#[test]
fn incremental_order_does_not_matter() {
    let inputs = annotations();
    let mut forward = graph_app();
    for input in &inputs {
        forward.create_annotation(input).unwrap();
    }
    let mut backward = graph_app();
    for input in inputs.iter().rev() {
        backward.create_annotation(input).unwrap();
    }
    assert_eq!(forward.db().ledger(), backward.db().ledger());
}

#[test]
fn rebuild_matches_incremental_ledger() {
    let mut app = graph_app();
    for input in &annotations() {
        app.create_annotation(input).unwrap();
    }
    let incremental = app.db().ledger().clone();
    let rows = app.db().closure_row_count();

    let report = app.rebuild().unwrap();
    assert_eq!(report.annotations, 3);
    assert_eq!(report.closure_rows, rows);
    assert_eq!(app.db().ledger(), &incremental);
    assert!(app.verify().unwrap().consistent);
}

#[test]
fn rebuild_repairs_drift() {
    let mut app = graph_app();
    for input in &annotations() {
        app.create_annotation(input).unwrap();
    }
    let expected = app.db().ledger().clone();
    let mammalia = app.db().find_by_description("mammalia")[0];

    let mut db = Database::from_snapshot(app.db().to_snapshot()).unwrap();
    db.with_transaction(|tx| {
        tx.apply_ledger_delta(LedgerDelta {
            term: mammalia,
            polarity: Polarity::High,
            seq_count: 100,
            experiment: ExperimentId(9),
            direction: Direction::Apply,
        })
    })
    .unwrap();

    let drift = verify_ledger(&db).unwrap();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].term, mammalia);
    assert_eq!(drift[0].actual.seq_count, drift[0].expected.seq_count + 100);

    BulkRebuilder::new(20).run(&mut db).unwrap();
    assert_eq!(db.ledger(), &expected);
    assert!(verify_ledger(&db).unwrap().is_empty());
}

#[test]
fn rebuild_picks_up_graph_changes() {
    let mut app = graph_app();
    for input in &annotations() {
        app.create_annotation(input).unwrap();
    }
    app.add_term(&NewTerm {
        description: "mammalia".to_string(),
        parent: Some("animalia".to_string()),
        ontology: "ncbitaxon".to_string(),
        ..NewTerm::default()
    })
    .unwrap();
    let animalia = app.db().find_by_description("animalia")[0];
    assert!(app.ledger_entry(animalia).is_zero());

    app.rebuild().unwrap();
    let entry = app.ledger_entry(animalia);
    assert_eq!(entry.annotation_count, 2);
    assert_eq!(entry.seq_count, 16);
    assert_eq!(entry.experiment_count, 2);
    assert_eq!(
        &ledger_from_projections(app.db().projections()).unwrap(),
        app.db().ledger()
    );
}
