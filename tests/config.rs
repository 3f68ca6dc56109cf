use assert_matches::assert_matches;

use onto_ledger::config::{Config, ConfigLoader, DEFAULT_MAX_CHILDREN};
use onto_ledger::error::OntoError;

#[test]
fn parse_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("onto-ledger.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "data_dir": "/tmp/onto-ledger",
            "max_chains": 5,
            "force_unique": true,
            "failpoints": ["ledger.apply"]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::load(path.to_str()).unwrap();
    assert_eq!(resolved.data_dir.as_str(), "/tmp/onto-ledger");
    assert_eq!(resolved.max_chains, 5);
    assert_eq!(resolved.max_children, DEFAULT_MAX_CHILDREN);
    assert!(resolved.force_unique);
    assert_eq!(resolved.failpoints, vec!["ledger.apply".to_string()]);
}

#[test]
fn invalid_configs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"max_chains\": \"many\" }").unwrap();
    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(OntoError::ConfigParse(_))
    );

    let missing = dir.path().join("missing.json");
    assert_matches!(
        ConfigLoader::load(missing.to_str()),
        Err(OntoError::ConfigRead(_))
    );

    let config = Config {
        data_dir: Some("/tmp/onto-ledger".to_string()),
        max_chains: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(OntoError::ConfigParse(_))
    );

    for entry in ["ledger.apply@x", "ledger.apply@0", "@2"] {
        let config = Config {
            data_dir: Some("/tmp/onto-ledger".to_string()),
            failpoints: Some(vec![entry.to_string()]),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(OntoError::ConfigParse(_)),
            "{entry} accepted"
        );
    }
}
