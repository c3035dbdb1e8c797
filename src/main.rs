use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use polathermal::config::Config;
use polathermal::export::{self, ExportFormat, ExportRequest};
use polathermal::scanner::Scanner;
use polathermal::{logging, Database, Group, ProtocolBuilder, Purpose};

#[derive(Parser)]
#[command(name = "polathermal", version, about = "Polarimetric thermal face dataset catalog")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog from the image tree and build all protocols
    Create {
        /// Erase the existing catalog first
        #[arg(short, long)]
        recreate: bool,

        /// Directory containing the dataset images
        #[arg(short = 'd', long)]
        image_dir: Option<PathBuf>,

        /// Only ingest files, do not build protocols
        #[arg(long)]
        no_protocols: bool,
    },
    /// List protocols with their per-group row counts
    Protocols,
    /// Print the files of a protocol
    Query {
        #[arg(short, long)]
        protocol: String,

        #[arg(short, long)]
        group: Option<GroupArg>,

        #[arg(long)]
        purpose: Option<PurposeArg>,

        /// Restrict to these clients (repeatable)
        #[arg(long = "client")]
        clients: Vec<String>,
    },
    /// Write the enroll/probe manifest of some models
    Export {
        #[arg(short, long)]
        protocol: String,

        #[arg(short, long, default_value = "dev")]
        group: GroupArg,

        /// Model ids; all models of the group when omitted
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Output file; defaults to `<protocol>.<format>`
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "json")]
        format: FormatArg,

        /// Extension appended to the image paths
        #[arg(long, default_value = ".png")]
        extension: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupArg {
    World,
    Dev,
    Eval,
}

impl From<GroupArg> for Group {
    fn from(g: GroupArg) -> Self {
        match g {
            GroupArg::World => Group::World,
            GroupArg::Dev => Group::Dev,
            GroupArg::Eval => Group::Eval,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PurposeArg {
    Train,
    Enroll,
    Probe,
}

impl From<PurposeArg> for Purpose {
    fn from(p: PurposeArg) -> Self {
        match p {
            PurposeArg::Train => Purpose::Train,
            PurposeArg::Enroll => Purpose::Enroll,
            PurposeArg::Probe => Purpose::Probe,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = logging::init(Some(Config::config_dir().join("logs")), cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Create { recreate, image_dir, no_protocols } => {
            if let Some(dir) = image_dir {
                config.dataset.image_dir = dir;
            }
            create(&config, recreate, no_protocols)
        }
        Commands::Protocols => list_protocols(&config),
        Commands::Query { protocol, group, purpose, clients } => {
            let db = open_catalog(&config)?;
            let clients = (!clients.is_empty()).then_some(clients);
            let files = db
                .query_checked(
                    &protocol,
                    group.map(Group::from),
                    purpose.map(Purpose::from),
                    clients.as_deref(),
                )
                .with_context(|| format!("Query of `{}` failed", protocol))?;
            for f in files {
                println!("{}\t{}\t{}\t{}", f.id, f.client_id, f.capture.modality(), f.path);
            }
            Ok(())
        }
        Commands::Export { protocol, group, models, output, format, extension } => {
            let db = open_catalog(&config)?;
            let format = ExportFormat::from(format);
            let output = output
                .unwrap_or_else(|| PathBuf::from(format!("{}.{}", protocol, format.extension())));
            let request = ExportRequest {
                protocol,
                group: group.into(),
                models,
                directory: config.dataset.image_dir.to_string_lossy().to_string(),
                extension,
            };
            let count = export::export_models(&db, &request, &output, format)?;
            println!("Wrote {} entries to {}", count, output.display());
            Ok(())
        }
    }
}

fn open_catalog(config: &Config) -> Result<Database> {
    let path = &config.db_path;
    if !path.exists() {
        anyhow::bail!("Catalog {} does not exist; run `polathermal create` first", path.display());
    }
    Database::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn create(config: &Config, recreate: bool, no_protocols: bool) -> Result<()> {
    let db_path = &config.db_path;
    if recreate && db_path.exists() {
        info!("Unlinking {}", db_path.display());
        std::fs::remove_file(db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
    }

    let mut db = Database::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    db.initialize()?;

    let report = Scanner::new(config.dataset.clone())
        .scan(&mut db)
        .context("Ingestion failed")?;
    println!(
        "Added {} clients and {} files ({} excluded, {} skipped, {} already present)",
        report.clients_added, report.files_added, report.excluded, report.skipped, report.existing
    );

    if no_protocols {
        return Ok(());
    }

    let mut builder = ProtocolBuilder::new(&mut db).replace_existing(true);
    let mut names = builder
        .build_original_protocols(&config.protocols.original_years)
        .context("Building original protocols failed")?;
    names.extend(
        builder
            .build_search_protocols(&config.protocols.search)
            .context("Building search protocols failed")?,
    );

    for name in &names {
        println!("{}\t{}", name, db.assignment_digest(name)?);
    }
    Ok(())
}

fn list_protocols(config: &Config) -> Result<()> {
    let db = open_catalog(config)?;
    for name in db.protocol_names()? {
        let summary = db.protocol_summary(&name)?;
        let counts = summary
            .counts
            .iter()
            .map(|(group, purpose, n)| format!("{}/{}={}", group, purpose, n))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}\t{} clients\t{}", name, summary.clients, counts);
    }
    Ok(())
}
