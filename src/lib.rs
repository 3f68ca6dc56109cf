pub mod app;
pub mod closure;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod family;
pub mod graph;
pub mod import;
pub mod ledger;
pub mod output;
pub mod projector;
pub mod rebuild;
pub mod stats;
pub mod store;
pub mod terms;
pub mod tree;
