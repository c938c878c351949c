use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use jdismantle::listing::{ClassListing, list_class};
use jdismantle::logging::init_logging;
use jdismantle::scan::{ClassInput, scan_inputs};
use jdismantle::visitor::TraversalReport;
use jdismantle::{ClassFile, VisitorConfig};

/// CLI arguments for a disassembly run.
#[derive(Parser, Debug)]
#[command(
    name = "jdismantle",
    about = "Disassemble JVM class files and JAR files into a deterministic listing.",
    version
)]
struct Cli {
    /// A `.class` file, a `.jar`, or a directory searched recursively.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// JSON traversal config; see `VisitorConfig`.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long)]
    no_invisible_annotations: bool,
    /// Write output here instead of stdout (`-` also means stdout).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct ListedClass {
    source: String,
    #[serde(flatten)]
    listing: ClassListing,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let started_at = Instant::now();
    let config = load_config(&cli)?;
    let inputs = scan_inputs(&cli.input)?;

    // Classes are independent; `collect` keeps the scan order.
    let results: Vec<Result<(ListedClass, TraversalReport)>> = inputs
        .par_iter()
        .map(|input| disassemble(input, &config))
        .collect();

    let (classes, totals) = gather(results);

    let mut writer = output_writer(cli.output.as_deref())?;
    match cli.format {
        OutputFormat::Text => write_text(&mut writer, &classes)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &classes)
                .context("failed to serialize JSON output")?;
            writer
                .write_all(b"\n")
                .context("failed to write JSON output")?;
        }
    }
    writer.flush().context("failed to flush output")?;

    info!(
        classes = classes.len(),
        skipped = totals.skipped,
        methods = totals.methods,
        instructions = totals.instructions,
        decode_failures = totals.decode_failures,
        discarded_annotations = totals.discarded_annotations,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "disassembly finished"
    );
    if totals.skipped > 0 {
        anyhow::bail!(
            "{} of {} classes could not be read",
            totals.skipped,
            inputs.len()
        );
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<VisitorConfig> {
    let mut config = match &cli.config {
        Some(path) => VisitorConfig::load(path)?,
        None => VisitorConfig::default(),
    };
    if cli.no_invisible_annotations {
        config.include_invisible_annotations = false;
    }
    Ok(config)
}

fn disassemble(input: &ClassInput, config: &VisitorConfig) -> Result<(ListedClass, TraversalReport)> {
    let class = ClassFile::parse(&input.bytes)
        .with_context(|| format!("failed to parse {}", input.label))?;
    let (listing, report) =
        list_class(&class, config).with_context(|| format!("failed to traverse {}", input.label))?;
    Ok((
        ListedClass {
            source: input.label.clone(),
            listing,
        },
        report,
    ))
}

/// Keeps the classes that were read, in order, and counts the rest.
fn gather(results: Vec<Result<(ListedClass, TraversalReport)>>) -> (Vec<ListedClass>, Totals) {
    let mut totals = Totals::default();
    let mut classes = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok((class, report)) => {
                totals = totals.add(&report);
                classes.push(class);
            }
            Err(err) => {
                warn!("skipping class: {err:#}");
                totals.skipped += 1;
            }
        }
    }
    (classes, totals)
}

#[derive(Default)]
struct Totals {
    methods: usize,
    instructions: usize,
    decode_failures: usize,
    discarded_annotations: usize,
    /// Classes that failed to parse and were left out of the output.
    skipped: usize,
}

impl Totals {
    fn add(self, report: &TraversalReport) -> Self {
        Self {
            methods: self.methods + report.methods_visited,
            instructions: self.instructions + report.instructions,
            decode_failures: self.decode_failures + report.decode_failures.len(),
            discarded_annotations: self.discarded_annotations + report.discarded_annotations.len(),
            skipped: self.skipped,
        }
    }
}

fn write_text(writer: &mut dyn Write, classes: &[ListedClass]) -> Result<()> {
    for (index, class) in classes.iter().enumerate() {
        if index > 0 {
            writeln!(writer).context("failed to write listing")?;
        }
        writeln!(writer, "// {}", class.source).context("failed to write listing")?;
        write!(writer, "{}", class.listing).context("failed to write listing")?;
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(BufWriter::new(io::stdout()))),
        Some(path) => Ok(Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        ))),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}
