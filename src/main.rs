use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use logstorage_operator::controller::{self, LogStorageConfig, Manifest, Reconciliation};
use logstorage_operator::Error;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the manifests to create and delete for a configuration snapshot
    Render(RenderArgs),
    /// Print the LogStorage status a reconcile of the snapshot would publish
    Status(SnapshotArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// YAML configuration snapshot
    #[arg(long, env = "LOGSTORAGE_CONFIG")]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    snapshot: SnapshotArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    output: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Serialize)]
struct RenderedSections<'a> {
    create: &'a [Manifest],
    delete: &'a [Manifest],
}

fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.log_json);

    match args.command {
        Commands::Version => {
            println!("LogStorage renderer v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Render(render_args) => run_render(render_args),
        Commands::Status(snapshot) => run_status(snapshot),
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}

fn run_render(args: RenderArgs) -> Result<(), Error> {
    let cfg = LogStorageConfig::from_yaml_file(&args.snapshot.config)?;
    info!(config = %args.snapshot.config.display(), "Rendering LogStorage");

    let rec = controller::reconcile(&cfg)?;
    info!(
        phase = ?rec.phase,
        create = rec.to_create.len(),
        delete = rec.to_delete.len(),
        finalizer_removable = rec.finalizer_removable(),
        "Reconciled"
    );

    let mut out = io::stdout().lock();
    match args.output {
        OutputFormat::Json => {
            let sections = RenderedSections {
                create: &rec.to_create,
                delete: &rec.to_delete,
            };
            serde_json::to_writer_pretty(&mut out, &sections)?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => write_yaml_stream(&mut out, &rec)?,
    }
    Ok(())
}

/// Multi-document YAML: the create section, then the delete section
fn write_yaml_stream(out: &mut impl Write, rec: &Reconciliation) -> Result<(), Error> {
    for (section, manifests) in [("create", &rec.to_create), ("delete", &rec.to_delete)] {
        writeln!(out, "# {section}")?;
        for manifest in manifests {
            writeln!(out, "---")?;
            write!(out, "{}", serde_yaml::to_string(manifest)?)?;
        }
    }
    Ok(())
}

fn run_status(args: SnapshotArgs) -> Result<(), Error> {
    let cfg = LogStorageConfig::from_yaml_file(&args.config)?;
    let result = controller::reconcile(&cfg);
    let previous = cfg.log_storage.as_ref().and_then(|ls| ls.status.as_ref());
    let status = controller::conditions::status_for(previous, cfg.readiness, &result);
    print!("{}", serde_yaml::to_string(&status)?);
    Ok(())
}
