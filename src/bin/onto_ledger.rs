use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use onto_ledger::app::{AnnotationInput, App};
use onto_ledger::config::ConfigLoader;
use onto_ledger::domain::{AnnotationId, Relation};
use onto_ledger::error::OntoError;
use onto_ledger::output::JsonOutput;
use onto_ledger::terms::NewTerm;

#[derive(Parser)]
#[command(name = "onto-ledger")]
#[command(about = "Ontology term graph with exact per-term annotation counts")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import an .obo or .obo.gz ontology file")]
    Import(ImportArgs),
    #[command(about = "Manage terms")]
    Term(TermArgs),
    #[command(about = "Add a synonym for a term")]
    Synonym(SynonymArgs),
    #[command(about = "List all ancestors of a term")]
    Parents(TermQuery),
    #[command(about = "List the maximal parent chains of a term")]
    Tree(TermQuery),
    #[command(about = "Export the parent/child family graph of terms")]
    Family(FamilyArgs),
    #[command(about = "Create, update or delete annotations")]
    Annotation(AnnotationArgs),
    #[command(about = "Annotation and experiment counts for terms or term pairs")]
    Stats(StatsArgs),
    #[command(about = "Recompute all closure rows and counts from stored annotations")]
    Rebuild,
    #[command(about = "Compare the ledger against the stored closure rows")]
    Check,
}

#[derive(Args)]
struct ImportArgs {
    path: Utf8PathBuf,

    #[arg(long)]
    ontology: String,
}

#[derive(Args)]
struct TermArgs {
    #[command(subcommand)]
    command: TermCommand,
}

#[derive(Subcommand)]
enum TermCommand {
    #[command(about = "Add a term under a parent (or the root)")]
    Add(TermAddArgs),
}

#[derive(Args)]
struct TermAddArgs {
    description: String,

    #[arg(long)]
    ontology: String,

    #[arg(long)]
    external_id: Option<String>,

    #[arg(long)]
    parent: Option<String>,

    #[arg(long)]
    parent_external_id: Option<String>,

    #[arg(long = "synonym")]
    synonyms: Vec<String>,
}

#[derive(Args)]
struct SynonymArgs {
    term: String,
    alias: String,
}

#[derive(Args)]
struct TermQuery {
    term: String,
}

#[derive(Args)]
struct FamilyArgs {
    #[arg(required = true)]
    terms: Vec<String>,

    #[arg(long, value_enum, default_value_t = Relation::Both)]
    relation: Relation,

    #[arg(long)]
    max_children: Option<usize>,
}

#[derive(Args)]
struct AnnotationArgs {
    #[command(subcommand)]
    command: AnnotationCommand,
}

#[derive(Subcommand)]
enum AnnotationCommand {
    #[command(about = "Create an annotation from a JSON file")]
    Add { file: Utf8PathBuf },
    #[command(about = "Replace the details of an annotation from a JSON file")]
    Update { id: u64, file: Utf8PathBuf },
    #[command(about = "Delete an annotation and retract its counts")]
    Delete { id: u64 },
}

#[derive(Args)]
struct StatsArgs {
    #[arg(required = true)]
    keys: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<OntoError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OntoError) -> u8 {
    match error {
        OntoError::NotFound(_) | OntoError::MissingConfig => 2,
        OntoError::LedgerInconsistency { .. }
        | OntoError::PairLedgerInconsistency(_)
        | OntoError::TransactionFailure(_)
        | OntoError::AlreadyProjected(_)
        | OntoError::RebuildValidation(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Commands::Family(args) = &cli.command
        && let Some(max_children) = args.max_children
    {
        config.max_children = max_children;
    }
    let mut app = App::open(config)?;

    match cli.command {
        Commands::Import(args) => {
            let report = app.import_obo(&args.path, &args.ontology)?;
            app.save()?;
            JsonOutput::print_import(&report).into_diagnostic()
        }
        Commands::Term(args) => match args.command {
            TermCommand::Add(args) => {
                let added = app.add_term(&NewTerm {
                    description: args.description,
                    external_id: args.external_id,
                    parent: args.parent,
                    parent_external_id: args.parent_external_id,
                    ontology: args.ontology,
                    synonyms: args.synonyms,
                })?;
                app.save()?;
                JsonOutput::print_json(&added).into_diagnostic()
            }
        },
        Commands::Synonym(args) => {
            let inserted = app.add_synonym(&args.term, &args.alias)?;
            app.save()?;
            JsonOutput::print_json(&serde_json::json!({ "inserted": inserted })).into_diagnostic()
        }
        Commands::Parents(args) => {
            let result = app.get_parents_as_names_and_ids(&args.term)?;
            JsonOutput::print_parents(&result).into_diagnostic()
        }
        Commands::Tree(args) => {
            let result = app.enumerate_maximal_chains(&args.term)?;
            JsonOutput::print_chains(&result).into_diagnostic()
        }
        Commands::Family(args) => {
            let report = app.build_family(&args.terms, args.relation)?;
            JsonOutput::print_family(&report).into_diagnostic()
        }
        Commands::Annotation(args) => {
            let result = match args.command {
                AnnotationCommand::Add { file } => {
                    app.create_annotation(&read_annotation(&file)?)?
                }
                AnnotationCommand::Update { id, file } => {
                    app.update_annotation(AnnotationId(id), &read_annotation(&file)?)?
                }
                AnnotationCommand::Delete { id } => app.delete_annotation(AnnotationId(id))?,
            };
            app.save()?;
            JsonOutput::print_annotation(&result).into_diagnostic()
        }
        Commands::Stats(args) => {
            let counts = app.term_counts(&args.keys);
            JsonOutput::print_counts(&counts).into_diagnostic()
        }
        Commands::Rebuild => {
            let report = app.rebuild()?;
            app.save()?;
            JsonOutput::print_rebuild(&report).into_diagnostic()
        }
        Commands::Check => {
            let result = app.verify()?;
            JsonOutput::print_check(&result).into_diagnostic()
        }
    }
}

fn read_annotation(path: &Utf8PathBuf) -> Result<AnnotationInput, OntoError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| OntoError::Filesystem(format!("{path}: {err}")))?;
    serde_json::from_str(&content).map_err(|err| OntoError::InvalidAnnotation(format!("{path}: {err}")))
}
