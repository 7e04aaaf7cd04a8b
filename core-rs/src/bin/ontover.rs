//! ontover - Ontology Version Manager CLI
//!
//! Command-line interface over the store configured in `.ontover.yaml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::warn;

use ontover_core::config::DEFAULT_CONFIG_FILE;
use ontover_core::manager::collect_ontology_files;
use ontover_core::{
    ArtifactEdit, DanglingPolicy, InferredIdentity, ManagedOntologyRecord, ManagerConfig, OntologyDocument,
    OntologyIdentity, OntologyVersionManager, OntoverError, PublishFilter, UpdatePolicy,
};

#[derive(Parser)]
#[command(name = "ontover")]
#[command(version)]
#[command(about = "Ontology version and dependency manager", long_about = None)]
struct Cli {
    /// Manager configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage schema ontologies (upload, current, versions, set-current, bootstrap, export)
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Manage artifacts (load, update, publish, delete, list, export)
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Upload schema files as one import-ordered batch
    Upload {
        /// Turtle or N-Triples files
        files: Vec<PathBuf>,
        /// Upload every ontology file under a directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show the current version of a schema
    Current {
        /// Base IRI
        iri: String,
    },
    /// List every version of a schema, current first
    Versions {
        /// Base IRI
        base: String,
    },
    /// Promote an existing version to current
    SetCurrent {
        /// Base IRI
        base: String,
        /// Version IRI
        version: String,
    },
    /// List current schemas
    List,
    /// Upload the files listed in the configured schema manifest
    Bootstrap,
    /// Export a schema version as N-Triples
    Export {
        /// Base IRI (current version) or version IRI
        iri: String,
        /// Include inferred statements
        #[arg(long)]
        inferred: bool,
    },
}

#[derive(Args)]
struct VersionRef {
    /// Artifact base IRI
    base: String,
    /// Version IRI (defaults to the current version)
    #[arg(long)]
    version: Option<String>,
}

impl VersionRef {
    fn identity(&self) -> ontover_core::Result<OntologyIdentity> {
        OntologyIdentity::new(self.base.clone(), self.version.clone())
    }
}

#[derive(Subcommand)]
enum ArtifactCommands {
    /// Load a new artifact
    Load {
        file: PathBuf,
        /// Dangling object policy (REPORT or FORCE_CLEAN)
        #[arg(long)]
        policy: Option<DanglingPolicy>,
    },
    /// Apply an edit to the current version, creating a new version
    Update {
        #[command(flatten)]
        target: VersionRef,
        /// Turtle file of statements to add
        #[arg(long)]
        add: Option<PathBuf>,
        /// Turtle file of statements to remove
        #[arg(long)]
        remove: Option<PathBuf>,
        /// REPLACE_EXISTING or MERGE_WITH_EXISTING
        #[arg(long, default_value = "MERGE_WITH_EXISTING")]
        update_policy: UpdatePolicy,
        /// Dangling object policy (REPORT or FORCE_CLEAN)
        #[arg(long)]
        policy: Option<DanglingPolicy>,
    },
    /// Publish a version (the current one by default)
    Publish {
        #[command(flatten)]
        target: VersionRef,
    },
    /// Delete one unpublished version
    Delete {
        /// Artifact base IRI
        base: String,
        /// Version IRI
        version: String,
    },
    /// List artifacts
    List {
        #[arg(long, conflicts_with = "unpublished")]
        published: bool,
        #[arg(long)]
        unpublished: bool,
    },
    /// List the versions of an artifact
    Versions {
        /// Artifact base IRI
        base: String,
    },
    /// Export an artifact version as N-Triples
    Export {
        #[command(flatten)]
        target: VersionRef,
        /// Include inferred statements
        #[arg(long)]
        inferred: bool,
    },
    /// Show the schema versions an artifact version imports
    Imports {
        #[command(flatten)]
        target: VersionRef,
    },
    /// Check reachability of a committed version without changing it
    Check {
        #[command(flatten)]
        target: VersionRef,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Project name
        #[arg(long, default_value = "ontover")]
        name: String,
        /// On-disk store directory, relative to the config file
        #[arg(long, default_value = ".ontover/store")]
        store: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate and print the configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        if let Some(detail) = err.downcast_ref::<OntoverError>() {
            print_error_detail(detail);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;

    if let Commands::Config { command } = &cli.command {
        return handle_config(command, &cli.config, json);
    }

    let manager = open_manager(&cli.config)?;
    match cli.command {
        Commands::Schema { command } => handle_schema(&manager, command, json),
        Commands::Artifact { command } => handle_artifact(&manager, command, json),
        Commands::Config { .. } => Ok(()),
    }
}

fn open_manager(path: &Path) -> anyhow::Result<OntologyVersionManager> {
    let config = if path.exists() {
        ManagerConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        warn!(path = %path.display(), "no config file, using a temporary in-memory store");
        ManagerConfig::default()
    };
    Ok(OntologyVersionManager::open(config)?)
}

// ===== SCHEMA COMMANDS =====

fn handle_schema(manager: &OntologyVersionManager, command: SchemaCommands, json: bool) -> anyhow::Result<()> {
    match command {
        SchemaCommands::Upload { files, dir } => {
            let mut paths = files;
            if let Some(dir) = dir {
                paths.extend(collect_ontology_files(&dir)?);
            }
            if paths.is_empty() {
                bail!("no schema files given");
            }
            let loaded = manager.upload_schema_files(&paths)?;
            print_identities("Uploaded", &loaded, json)
        }
        SchemaCommands::Current { iri } => {
            let current = manager.get_current_schema_version(&iri)?;
            print_identities("Current", std::slice::from_ref(&current), json)
        }
        SchemaCommands::Versions { base } => print_records(&manager.list_schema_versions(&base)?, json),
        SchemaCommands::SetCurrent { base, version } => {
            let current = manager.set_current_schema_version(&base, &version)?;
            print_identities("Promoted", std::slice::from_ref(&current), json)
        }
        SchemaCommands::List => print_records(&manager.list_schemas()?, json),
        SchemaCommands::Bootstrap => {
            let loaded = manager.bootstrap_schemas()?;
            print_identities("Bootstrapped", &loaded, json)
        }
        SchemaCommands::Export { iri, inferred } => {
            print!("{}", manager.export_schema(&iri, inferred)?);
            Ok(())
        }
    }
}

// ===== ARTIFACT COMMANDS =====

fn handle_artifact(manager: &OntologyVersionManager, command: ArtifactCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ArtifactCommands::Load { file, policy } => {
            let loaded = manager.load_artifact_file(&file, policy)?;
            print_identities("Loaded", std::slice::from_ref(&loaded), json)
        }
        ArtifactCommands::Update {
            target,
            add,
            remove,
            update_policy,
            policy,
        } => {
            let mut edit = match add {
                Some(path) => ArtifactEdit::from_turtle(&read(&path)?)?,
                None => ArtifactEdit::new(),
            };
            if let Some(path) = remove {
                edit.removals = ArtifactEdit::from_turtle(&read(&path)?)?.additions;
            }
            let edit = edit.with_policy(update_policy);

            let identity = match target.version {
                Some(_) => target.identity()?,
                None => manager.get_current_artifact_version(&target.base)?.identity(),
            };
            let updated = manager.update_artifact(&identity, edit, policy)?;
            print_identities("Updated", std::slice::from_ref(&updated), json)
        }
        ArtifactCommands::Publish { target } => {
            let published = manager.publish_artifact(&target.identity()?)?;
            print_identities("Published", std::slice::from_ref(&published), json)
        }
        ArtifactCommands::Delete { base, version } => {
            let identity = OntologyIdentity::versioned(base, version)?;
            let deleted = manager.delete_artifact_version(&identity)?;
            if json {
                println!("{}", serde_json::json!({ "deleted": deleted, "identity": identity.to_string() }));
            } else if deleted {
                println!("{} {}", "✓ Deleted".green(), identity);
            } else {
                println!("{} {} is not managed", "-".yellow(), identity);
            }
            Ok(())
        }
        ArtifactCommands::List { published, unpublished } => {
            let filter = if published {
                PublishFilter::Published
            } else if unpublished {
                PublishFilter::Unpublished
            } else {
                PublishFilter::All
            };
            print_records(&manager.list_artifacts(filter)?, json)
        }
        ArtifactCommands::Versions { base } => print_records(&manager.list_artifact_versions(&base)?, json),
        ArtifactCommands::Export { target, inferred } => {
            print!("{}", manager.export_artifact(&target.identity()?, inferred)?);
            Ok(())
        }
        ArtifactCommands::Imports { target } => {
            let imports = manager.artifact_schema_imports(&target.identity()?)?;
            if json {
                print_json(&imports)
            } else {
                for import in imports {
                    println!("  {}", import);
                }
                Ok(())
            }
        }
        ArtifactCommands::Check { target } => {
            let report = manager.check_reachability(&target.identity()?)?;
            if json {
                return print_json(&report);
            }
            println!("Top object: {}", report.top_object.bold());
            println!("Reachable:  {}", report.reachable.len());
            if report.is_connected() {
                println!("{}", "✓ No dangling objects".green());
            } else {
                println!("{} {} dangling object(s):", "✗".red(), report.dangling.len());
                for object in &report.dangling {
                    println!("  {}", object);
                }
            }
            Ok(())
        }
    }
}

// ===== CONFIG COMMANDS =====

fn handle_config(command: &ConfigCommands, path: &Path, json: bool) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Init { name, store, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let mut config = ManagerConfig::new(name.clone());
            config.spec.store_path = Some(store.clone());
            config.validate()?;
            config.save(path)?;
            println!("{} {}", "✓ Wrote".green(), path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = ManagerConfig::load(path)?;
            if json {
                print_json(&config)
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
                Ok(())
            }
        }
    }
}

// ===== OUTPUT =====

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_identities(action: &str, identities: &[InferredIdentity], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(identities);
    }
    for identity in identities {
        println!("{} {}", format!("✓ {}", action).green(), identity.base_iri.bold());
        println!("  Version:  {}", identity.version_iri);
        println!("  Inferred: {}", identity.inferred_iri.dimmed());
    }
    Ok(())
}

fn print_records(records: &[ManagedOntologyRecord], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(records);
    }
    if records.is_empty() {
        println!("{}", "No ontologies found".dimmed());
        return Ok(());
    }
    for record in records {
        let mut flags = Vec::new();
        if record.is_current {
            flags.push("current".green().to_string());
        }
        if record.is_published {
            flags.push("published".cyan().to_string());
        }
        println!(
            "{:>4}  {}  {}",
            record.sequence,
            record.version_iri.bold(),
            flags.join(" ")
        );
        for import in &record.imports {
            println!("        imports {}", import.to_string().dimmed());
        }
    }
    Ok(())
}

fn print_error_detail(err: &OntoverError) {
    match err {
        OntoverError::ProfileViolation(report) => {
            for violation in &report.violations {
                eprintln!("  - {}", violation);
            }
        }
        OntoverError::InconsistentOntology(report) => {
            for explanation in &report.explanations {
                eprintln!("  - {}", explanation);
            }
        }
        OntoverError::DisconnectedObjects { dangling, .. } => {
            for object in dangling {
                eprintln!("  - {}", object);
            }
            eprintln!("\nRe-run with --policy FORCE_CLEAN to remove them.");
        }
        OntoverError::CyclicImport { base_iris } => {
            for base in base_iris {
                eprintln!("  - {}", base);
            }
        }
        _ => {}
    }
}
