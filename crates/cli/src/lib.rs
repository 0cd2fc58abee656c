use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use doc_model::{AnnotationSnapshot, ViewerConfig};
use pdf_engine::{default_engine, OpenSource, PdfEngine};
use pdfcraft_core::{ExportOptions, Viewer};
use serde::Serialize;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{share_file_name, BlobStore, FsBlobStore, Storage};

#[derive(Debug, Parser)]
#[command(name = "pdfcraft-cli")]
#[command(about = "PDFCraft Pro CLI")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Viewer config file. Defaults to config.json in the data directory.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write a copy of a PDF with annotations merged into its pages.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Annotation snapshot (JSON) to merge.
        #[arg(long, value_name = "JSON")]
        annotations: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Draw sticky notes into the page content.
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flatten_notes: bool,
        /// Attach sticky notes as PDF text annotations.
        #[arg(long)]
        note_annotations: bool,
    },
    /// Store and retrieve documents shared locally by id.
    Share {
        #[command(subcommand)]
        command: ShareCommand,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum ShareCommand {
    /// Store a PDF under an id.
    Put {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        id: String,
        /// Directory holding shared documents.
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
    },
    /// Write the PDF stored under an id to `shared-<ID>.pdf`.
    Get {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
    rotate: u16,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Export { file, annotations, output, flatten_notes, note_annotations } => {
            let config = load_config(cli.config.as_deref())?;
            let options = ExportOptions { flatten_notes, note_annotations };
            run_export(&file, annotations.as_deref(), output.as_deref(), config, &options)
        }
        Commands::Share { command } => match command {
            ShareCommand::Put { file, id, store } => run_share_put(&file, &id, store),
            ShareCommand::Get { id, store, output_dir } => {
                run_share_get(&id, store, output_dir.as_deref())
            }
        },
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();

    // A logger may already be installed when `run` is called more than once in-process.
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => storage::load_config_file(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => match Storage::from_default_project() {
            Ok(storage) => storage.load_config().context("failed to read viewer config"),
            Err(error) => {
                log::warn!("{error}; using default viewer config");
                Ok(ViewerConfig::default())
            }
        },
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.load_document(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|index| {
            engine.page_size(handle, index).map(|size| PageSizeOutput {
                width: size.width_pt,
                height: size.height_pt,
                rotate: size.rotate,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_export(
    file: &Path,
    annotations: Option<&Path>,
    output: Option<&Path>,
    config: ViewerConfig,
    options: &ExportOptions,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let snapshot = match annotations {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read annotations {}", path.display()))?;
            serde_json::from_slice::<AnnotationSnapshot>(&bytes)
                .with_context(|| format!("invalid annotations file {}", path.display()))?
        }
        None => AnnotationSnapshot::default(),
    };

    let mut viewer = Viewer::new(default_engine(), config);
    viewer.load_file(file).context("failed to open PDF")?;
    let imported = viewer.import_annotations(snapshot);
    log::info!("imported {imported} annotations");

    let bytes = viewer.export(options).context("failed to export PDF")?;

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_export_output(file));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, bytes)
        .with_context(|| format!("failed to write PDF to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_share_put(file: &Path, id: &str, store: Option<PathBuf>) -> Result<()> {
    ensure_pdf_exists(file)?;

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut store = open_share_store(store)?;
    store.put(id, &bytes).with_context(|| format!("failed to store shared document {id}"))?;

    println!("{id}");

    Ok(())
}

fn run_share_get(id: &str, store: Option<PathBuf>, output_dir: Option<&Path>) -> Result<()> {
    let store = open_share_store(store)?;
    let bytes = store
        .get(id)
        .with_context(|| format!("failed to read shared document {id}"))?
        .with_context(|| format!("shared document not found: {id}"))?;

    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let output = dir.join(share_file_name(id));
    fs::write(&output, bytes)
        .with_context(|| format!("failed to write PDF to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn open_share_store(dir: Option<PathBuf>) -> Result<FsBlobStore> {
    match dir {
        Some(dir) => Ok(FsBlobStore::new(dir)),
        None => Ok(Storage::from_default_project()
            .context("no --store given and no data directory available")?
            .shared_documents()),
    }
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_export_output(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-annotated.pdf"))
}
