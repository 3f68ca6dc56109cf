use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::db::parse_failpoint;
use crate::error::OntoError;
use crate::store::Store;

pub const DEFAULT_CONFIG_FILE: &str = "onto-ledger.json";
pub const DEFAULT_MAX_CHAINS: usize = 20;
pub const DEFAULT_MAX_CHILDREN: usize = 1000;
pub const DEFAULT_MAX_PAIR_TERMS: usize = 20;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub max_chains: Option<usize>,
    #[serde(default)]
    pub max_children: Option<usize>,
    #[serde(default)]
    pub max_pair_terms: Option<usize>,
    #[serde(default)]
    pub force_unique: Option<bool>,
    #[serde(default)]
    pub failpoints: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub max_chains: usize,
    pub max_children: usize,
    pub max_pair_terms: usize,
    pub force_unique: bool,
    pub failpoints: Vec<String>,
}

impl ResolvedConfig {
    pub fn with_data_dir(data_dir: Utf8PathBuf) -> Self {
        Self {
            schema_version: 1,
            data_dir,
            max_chains: DEFAULT_MAX_CHAINS,
            max_children: DEFAULT_MAX_CHILDREN,
            max_pair_terms: DEFAULT_MAX_PAIR_TERMS,
            force_unique: false,
            failpoints: Vec::new(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `onto-ledger.json` in the current directory.
    pub fn load(path: Option<&str>) -> Result<ResolvedConfig, OntoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(OntoError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| OntoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| OntoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::load`], but a missing default file means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OntoError> {
        match Self::load(path) {
            Err(OntoError::MissingConfig) => Self::resolve_config(Config::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OntoError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(OntoError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let data_dir = match config.data_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => Store::default_root()?,
        };

        let max_chains = config.max_chains.unwrap_or(DEFAULT_MAX_CHAINS);
        if max_chains == 0 {
            return Err(OntoError::ConfigParse(
                "max_chains must be at least 1".to_string(),
            ));
        }

        let failpoints = config.failpoints.unwrap_or_default();
        for entry in &failpoints {
            parse_failpoint(entry)?;
        }

        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            max_chains,
            max_children: config.max_children.unwrap_or(DEFAULT_MAX_CHILDREN),
            max_pair_terms: config.max_pair_terms.unwrap_or(DEFAULT_MAX_PAIR_TERMS),
            force_unique: config.force_unique.unwrap_or(false),
            failpoints,
        })
    }
}
