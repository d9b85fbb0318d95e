//! jserial - Inspect Java object serialization streams
//!
//! This tool decodes serialization streams without loading any of the
//! classes they describe, and prints the stream contents, source-like class
//! declarations and an instance dump.

use anyhow::{bail, Context, Result};
use clap::Parser;
use jserial_core::{
    DecoderConfig, ObjectStream, RenderConfig, Renderer, StreamStats, STREAM_HEADER,
};
use regex::Regex;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect Java object serialization streams
#[derive(Parser, Debug)]
#[command(name = "jserial")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Stream files to decode
    #[arg(required_unless_present = "directory", conflicts_with = "directory")]
    files: Vec<PathBuf>,

    /// Decode every stream file below this directory
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't print the stream content listing
    #[arg(long)]
    no_content: bool,

    /// Don't print class declarations
    #[arg(long)]
    no_classes: bool,

    /// Don't print the instance dump
    #[arg(long)]
    no_instances: bool,

    /// Include array classes in class declarations
    #[arg(long)]
    show_arrays: bool,

    /// Rewrite class names that aren't legal identifiers
    #[arg(long)]
    fix_names: bool,

    /// Leave classes whose name matches this regex out of class declarations
    #[arg(long, value_name = "REGEX")]
    filter: Option<String>,

    /// Don't connect inner and static member classes to their outer classes
    #[arg(long)]
    no_connect: bool,

    /// Reject long-string records short enough for the short form
    #[arg(long)]
    strict_long_strings: bool,

    /// Write the concatenated top-level block data to this file
    #[arg(long, value_name = "FILE")]
    blockdata: Option<PathBuf>,

    /// Write one line per top-level block data payload (size and digest) to this file
    #[arg(long, value_name = "FILE")]
    blockdata_manifest: Option<PathBuf>,

    /// Overwrite existing block data output files
    #[arg(long)]
    force: bool,
}

impl Cli {
    fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig::new()
            .connect_member_classes(!self.no_connect)
            .strict_long_strings(self.strict_long_strings)
    }

    fn render_config(&self) -> Result<RenderConfig> {
        let exclude = self
            .filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid --filter pattern")?;
        Ok(RenderConfig::new()
            .show_arrays(self.show_arrays)
            .fix_names(self.fix_names)
            .exclude(exclude))
    }
}

/// Which output stages to print
#[derive(Debug, Clone, Copy)]
struct Stages {
    content: bool,
    classes: bool,
    instances: bool,
}

impl From<&Cli> for Stages {
    fn from(cli: &Cli) -> Self {
        Self {
            content: !cli.no_content,
            classes: !cli.no_classes,
            instances: !cli.no_instances,
        }
    }
}

/// Destination for top-level block data across all inputs
#[derive(Default)]
struct BlockDataSink {
    data: Option<BufWriter<fs::File>>,
    manifest: Option<BufWriter<fs::File>>,
    blocks: usize,
}

impl BlockDataSink {
    fn create(cli: &Cli) -> Result<Self> {
        let mut sink = Self::default();
        if let Some(path) = &cli.blockdata {
            sink.data = Some(BufWriter::new(create_output_file(path, cli.force)?));
        }
        if let Some(path) = &cli.blockdata_manifest {
            let mut manifest = BufWriter::new(create_output_file(path, cli.force)?);
            writeln!(
                manifest,
                "# Each line in this file that doesn't begin with a '#' contains the size of"
            )?;
            writeln!(
                manifest,
                "# an individual blockdata block written to the stream, and a digest of it."
            )?;
            sink.manifest = Some(manifest);
        }
        Ok(sink)
    }

    fn is_active(&self) -> bool {
        self.data.is_some() || self.manifest.is_some()
    }

    fn record(&mut self, block: &[u8]) -> Result<()> {
        self.blocks += 1;
        if let Some(out) = &mut self.data {
            out.write_all(block).context("Failed to write block data")?;
        }
        if let Some(out) = &mut self.manifest {
            writeln!(out, "{} {}", block.len(), short_digest(block))
                .context("Failed to write block data manifest")?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(out) = &mut self.data {
            out.flush().context("Failed to flush block data")?;
        }
        if let Some(out) = &mut self.manifest {
            out.flush().context("Failed to flush block data manifest")?;
        }
        if self.is_active() {
            info!("Wrote {} block data payload(s)", self.blocks);
        }
        Ok(())
    }
}

/// Short hex digest of a payload (first 16 chars of blake3)
fn short_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex()[..16].to_string()
}

/// Create an output file, refusing to clobber unless forced
fn create_output_file(path: &Path, force: bool) -> Result<fs::File> {
    if path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let inputs = collect_inputs(&cli)?;
    let render = cli.render_config()?;
    let mut sink = BlockDataSink::create(&cli)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut decoded = 0usize;
    for path in &inputs {
        match process_stream(&cli, path, &render, &mut sink) {
            Ok(report) => {
                if inputs.len() > 1 {
                    writeln!(out, "//// FILE {}", path.display())?;
                }
                out.write_all(report.as_bytes())?;
                decoded += 1;
            }
            Err(e) => {
                // Log error but continue with other files
                warn!("Error processing {}: {:#}", path.display(), e);
            }
        }
    }
    out.flush()?;
    sink.finish()?;

    info!("Decoded {} of {} stream(s)", decoded, inputs.len());
    if decoded == 0 {
        bail!("No input could be decoded");
    }
    Ok(())
}

/// Resolve the positional files or walk the input directory
fn collect_inputs(cli: &Cli) -> Result<Vec<PathBuf>> {
    let Some(directory) = &cli.directory else {
        for file in &cli.files {
            if !file.is_file() {
                bail!("Input file does not exist: {}", file.display());
            }
        }
        return Ok(cli.files.clone());
    };

    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }
    info!("Scanning directory: {}", directory.display());

    let mut inputs = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }

        if !is_likely_stream(path) {
            trace!("Skipping non-stream: {}", path.display());
            continue;
        }
        inputs.push(path.to_path_buf());
    }

    if inputs.is_empty() {
        bail!("No serialization streams found in {}", directory.display());
    }
    Ok(inputs)
}

/// True if the file starts with the stream magic and version
fn is_likely_stream(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut header = [0u8; 4];
    file.read_exact(&mut header).is_ok() && header == STREAM_HEADER
}

/// Decode one stream and render the selected stages
fn process_stream(
    cli: &Cli,
    path: &Path,
    render: &RenderConfig,
    sink: &mut BlockDataSink,
) -> Result<String> {
    debug!("Decoding {}", path.display());
    let stream = ObjectStream::from_file(path, cli.decoder_config())
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    info!("{}: {}", path.display(), StreamStats::collect(&stream));

    if sink.is_active() {
        for block in stream.block_data() {
            sink.record(&block.data)?;
        }
    }

    render_report(&stream, render, Stages::from(cli))
}

/// Render the enabled stages, each framed by BEGIN/END lines
fn render_report(stream: &ObjectStream, config: &RenderConfig, stages: Stages) -> Result<String> {
    let renderer = Renderer::new(stream, config);
    let mut report = String::new();

    if stages.content {
        report.push_str("//// BEGIN stream content output\n");
        renderer.write_content_listing(&mut report)?;
        report.push_str("//// END stream content output\n\n");
    }

    if stages.classes {
        let title = renderer.class_declarations_title();
        report.push_str(&format!("//// BEGIN {}\n", title));
        renderer.write_class_declarations(&mut report)?;
        report.push_str("//// END class declarations\n\n");
    }

    if stages.instances {
        report.push_str("//// BEGIN instance dump\n");
        renderer.write_instance_dump(&mut report)?;
        report.push_str("//// END instance dump\n\n");
    }

    Ok(report)
}
