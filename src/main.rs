// ==============================================================================
// main.rs - Genomics Processor Entry Point
// ==============================================================================
// Description: Command-line entry point for genomic file ingestion, quality
//              control and polygenic risk scoring
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genomics_processor::panel::RiskPanelRegistry;
use genomics_processor::pipeline::GenomicProcessor;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Genomic input file (.vcf, .fastq/.fq, optionally .gz)
    input: PathBuf,

    /// Risk panel CSV (defaults to the built-in GWAS panels)
    #[arg(short, long)]
    panel: Option<PathBuf>,

    /// Score only these disease tags (repeatable)
    #[arg(short, long)]
    disease: Vec<String>,

    /// Abort parsing after this many seconds, keeping partial statistics
    #[arg(long)]
    time_limit_secs: Option<u64>,

    /// Override the VCF statistics sampling cap
    #[arg(long)]
    vcf_record_cap: Option<u64>,

    /// Override the FASTQ duplicate-hashing cap
    #[arg(long)]
    fastq_read_cap: Option<u64>,

    /// Write the result JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the result JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genomics_processor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let registry = match &args.panel {
        Some(path) => RiskPanelRegistry::from_csv_path(path)
            .with_context(|| format!("failed to load risk panels from {}", path.display()))?,
        None => RiskPanelRegistry::builtin(),
    };
    info!(panels = registry.panel_count(), "risk panels loaded");

    let mut processor = GenomicProcessor::new(registry);
    if let Some(secs) = args.time_limit_secs {
        processor = processor.with_time_limit(Duration::from_secs(secs));
    }
    if let Some(cap) = args.vcf_record_cap {
        processor = processor.with_vcf_record_cap(cap);
    }
    if let Some(cap) = args.fastq_read_cap {
        processor = processor.with_fastq_read_cap(cap);
    }
    if !args.disease.is_empty() {
        processor = processor.with_diseases(args.disease.clone());
    }

    let result = processor
        .process_path(&args.input)
        .with_context(|| format!("failed to process {}", args.input.display()))?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(output = %path.display(), "result written");
        }
        None => println!("{json}"),
    }

    Ok(())
}
