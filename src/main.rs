//! glbforge CLI
//!
//! Command-line interface for exporting scene manifests to GLB and
//! inspecting GLB files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use glbforge_export::logging::{init_with_config, TracingConfig};
use glbforge_export::{GlbFile, GlbSummary, GltfExportOptions, GltfExporter, SceneManifest};

/// glbforge - scene graph to binary glTF exporter
#[derive(Parser)]
#[command(name = "glbforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene manifest to a GLB file
    Export(ExportArgs),

    /// Show the contents of a GLB file
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Scene manifest (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output GLB file
    #[arg(short, long)]
    output: PathBuf,

    /// Use placeholder materials instead of embedding textures
    #[arg(long)]
    no_textures: bool,

    /// Leave animations out
    #[arg(long)]
    no_animations: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Path to the GLB file
    path: PathBuf,
}

fn setup_logging(verbosity: u8) {
    let config = match verbosity {
        0 => TracingConfig::default(),
        1 => TracingConfig::with_level(Level::INFO),
        2 => TracingConfig::with_level(Level::DEBUG),
        _ => TracingConfig::with_level(Level::TRACE),
    };

    init_with_config(TracingConfig {
        show_target: verbosity >= 2,
        show_thread_ids: verbosity >= 3,
        show_file: verbosity >= 3,
        show_line_number: verbosity >= 3,
        ..config
    });
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Export(args) => cmd_export(args),
        Commands::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn cmd_export(args: ExportArgs) -> Result<()> {
    info!("Loading manifest: {:?}", args.input);

    let scene = SceneManifest::load_scene(&args.input)
        .with_context(|| format!("Failed to load scene manifest {}", args.input.display()))?;

    let options = GltfExportOptions {
        embed_textures: !args.no_textures,
        export_animations: !args.no_animations,
        ..Default::default()
    };
    GltfExporter::new(options)
        .export(&scene, &args.output)
        .with_context(|| format!("Failed to export {}", args.output.display()))?;

    println!("Exported {} models to {}", scene.model_count(), args.output.display());
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let summary = inspect(&args.path)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("GLB File: {}", args.path.display());
            println!("  Version:      {}", summary.version);
            println!("  Total size:   {} bytes", summary.total_length);
            println!("  JSON chunk:   {} bytes", summary.json_length);
            println!("  BIN chunk:    {} bytes", summary.bin_length);
            println!("  Nodes:        {}", summary.nodes);
            println!("  Meshes:       {}", summary.meshes);
            println!("  Materials:    {}", summary.materials);
            println!("  Textures:     {}", summary.textures);
            println!("  Images:       {}", summary.images);
            println!("  Accessors:    {}", summary.accessors);
            println!("  Buffer views: {}", summary.buffer_views);
            println!("  Skins:        {}", summary.skins);
            println!("  Animations:   {} ({} channels)", summary.animations, summary.channels);
        }
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<GlbSummary> {
    let glb = GlbFile::from_path(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(glb.summary())
}
