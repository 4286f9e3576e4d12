// ==============================================================================
// pipeline.rs - Genomic Processing Pipeline
// ==============================================================================
// Description: Sequential orchestration of format detection, parsing, quality
//              control and polygenic risk scoring over one input stream
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Stage order is fixed: Detecting -> Parsing -> QualityChecking -> Scoring.
// Quality control and scoring consume finalized statistics, so no stage may
// be skipped or reordered. A fatal error in any stage aborts the run with a
// typed ProcessingError; only per-disease scoring failures are isolated.
// ==============================================================================

use std::fs::File;
use std::io::{BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::detector::{self, Detection, SNIFF_WINDOW};
use crate::error::ProcessingError;
use crate::models::{
    AggregateStats, DiseaseRisk, FileType, ProcessingResult, RESULT_SCHEMA_VERSION,
};
use crate::panel::RiskPanelRegistry;
use crate::parsers::{Deadline, FastqAnalyzer, VcfAnalyzer};
use crate::prs::PolygenicRiskCalculator;
use crate::quality::QualityController;

/// Read tee that fingerprints the raw input bytes as they are consumed
///
/// Sits underneath any decompression layer so the hash always covers the
/// bytes as uploaded, compressed or not.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize(self) -> String {
        self.hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

type RawStream<R> = Chain<Cursor<Vec<u8>>, HashingReader<R>>;

/// Input stream handed to the parsers, with or without a gzip layer
enum InputStream<R: Read> {
    Plain(BufReader<RawStream<R>>),
    // MultiGzDecoder handles concatenated gzip members, common in
    // block-compressed genomic uploads
    Gzip(BufReader<MultiGzDecoder<RawStream<R>>>),
}

impl<R: Read> InputStream<R> {
    fn new(raw: RawStream<R>, compressed: bool) -> Self {
        if compressed {
            InputStream::Gzip(BufReader::new(MultiGzDecoder::new(raw)))
        } else {
            InputStream::Plain(BufReader::new(raw))
        }
    }

    /// Recover the hashing tee once parsing is done
    fn finish(self) -> HashingReader<R> {
        match self {
            InputStream::Plain(reader) => reader.into_inner().into_inner().1,
            InputStream::Gzip(reader) => reader.into_inner().into_inner().into_inner().1,
        }
    }
}

impl<R: Read> Read for InputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            InputStream::Plain(r) => r.read(buf),
            InputStream::Gzip(r) => r.read(buf),
        }
    }
}

impl<R: Read> BufRead for InputStream<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            InputStream::Plain(r) => r.fill_buf(),
            InputStream::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            InputStream::Plain(r) => r.consume(amt),
            InputStream::Gzip(r) => r.consume(amt),
        }
    }
}

/// Single-threaded genomic processing pipeline
///
/// One instance can process any number of files; each `process_*` call is an
/// independent run against the shared read-only panel registry.
pub struct GenomicProcessor {
    registry: RiskPanelRegistry,
    time_limit: Option<Duration>,
    vcf_record_cap: Option<u64>,
    fastq_read_cap: Option<u64>,
    diseases: Option<Vec<String>>,
}

impl GenomicProcessor {
    pub fn new(registry: RiskPanelRegistry) -> Self {
        Self {
            registry,
            time_limit: None,
            vcf_record_cap: None,
            fastq_read_cap: None,
            diseases: None,
        }
    }

    /// Wall-clock budget for a single run; expiry mid-parse keeps partial
    /// statistics, expiry before the first record is a `Timeout` error
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_vcf_record_cap(mut self, cap: u64) -> Self {
        self.vcf_record_cap = Some(cap);
        self
    }

    pub fn with_fastq_read_cap(mut self, cap: u64) -> Self {
        self.fastq_read_cap = Some(cap);
        self
    }

    /// Restrict scoring to the given disease tags instead of all panels
    pub fn with_diseases(mut self, diseases: Vec<String>) -> Self {
        self.diseases = Some(diseases);
        self
    }

    pub fn registry(&self) -> &RiskPanelRegistry {
        &self.registry
    }

    /// Process a file on disk
    pub fn process_path(&self, path: impl AsRef<Path>) -> Result<ProcessingResult, ProcessingError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = File::open(path)?;
        self.process_reader(file, &filename)
    }

    /// Process an arbitrary byte stream; `filename` only informs detection
    pub fn process_reader<R: Read>(
        &self,
        reader: R,
        filename: &str,
    ) -> Result<ProcessingResult, ProcessingError> {
        if let Some(tags) = &self.diseases {
            for tag in tags {
                if self.registry.panel_for(tag).is_none() {
                    return Err(ProcessingError::PanelNotFound(tag.clone()));
                }
            }
        }
        if self.registry.is_empty() {
            return Err(ProcessingError::PanelNotFound(
                "no panels registered".to_string(),
            ));
        }

        info!(filename, stage = "detecting", "pipeline run started");

        let mut hashing = HashingReader::new(reader);
        let mut prefix = vec![0u8; SNIFF_WINDOW];
        let filled = read_fill(&mut hashing, &mut prefix)?;
        prefix.truncate(filled);

        if prefix.is_empty() {
            return Err(ProcessingError::EmptyFile);
        }

        let Detection {
            file_type,
            compressed,
        } = detector::detect(&prefix, filename);

        if file_type == FileType::Unknown {
            let label = if filename.is_empty() {
                "unrecognized content".to_string()
            } else {
                filename.to_string()
            };
            return Err(ProcessingError::UnsupportedFormat(label));
        }

        info!(?file_type, compressed, stage = "parsing", "format detected");

        let deadline = Deadline::from_limit(self.time_limit);
        let mut stream = InputStream::new(Cursor::new(prefix).chain(hashing), compressed);

        let (stats, matched) = match file_type {
            FileType::Vcf => {
                let mut analyzer = VcfAnalyzer::new(&self.registry);
                if let Some(cap) = self.vcf_record_cap {
                    analyzer = analyzer.with_record_cap(cap);
                }
                let analysis = analyzer.parse(&mut stream, &deadline)?;
                (AggregateStats::Vcf(analysis.stats), analysis.matched)
            }
            FileType::Fastq => {
                let mut analyzer = FastqAnalyzer::new();
                if let Some(cap) = self.fastq_read_cap {
                    analyzer = analyzer.with_read_cap(cap);
                }
                let stats = analyzer.parse(&mut stream, &deadline)?;
                (AggregateStats::Fastq(stats), Vec::new())
            }
            FileType::Unknown => unreachable!("rejected above"),
        };

        let input_sha256 = stream.finish().finalize();

        info!(
            records = stats.records_processed(),
            matched = matched.len(),
            stage = "quality_checking",
            "parse finalized"
        );

        let quality = QualityController::evaluate(&stats);

        info!(rating = ?quality.rating, stage = "scoring", "quality verdict ready");

        let calculator = PolygenicRiskCalculator::new(&self.registry);
        let mut prs = match file_type {
            // Reads carry no variant calls, so every disease gets the
            // population-average estimate
            FileType::Fastq => calculator.fallback_all(),
            _ => calculator.score_all(&matched),
        };
        if let Some(tags) = &self.diseases {
            prs.retain(|risk| {
                let disease = match risk {
                    DiseaseRisk::Scored(p) => p.disease.as_str(),
                    DiseaseRisk::Errored { disease, .. } => disease.as_str(),
                };
                tags.iter().any(|t| t == disease)
            });
        }

        let result = ProcessingResult {
            schema_version: RESULT_SCHEMA_VERSION,
            file_type,
            compressed,
            sampled: stats.sampled(),
            timed_out: stats.timed_out(),
            records_processed: stats.records_processed(),
            stats,
            quality,
            matched_variants: matched,
            prs,
            input_sha256,
        };

        info!(
            records = result.records_processed,
            sampled = result.sampled,
            stage = "done",
            "pipeline run complete"
        );

        Ok(result)
    }
}

/// Fill as much of `buf` as the reader can provide before EOF
fn read_fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
