// ==============================================================================
// parsers/vcf.rs - Streaming VCF Analyzer
// ==============================================================================
// Description: Single-pass VCF parser producing aggregate variant statistics
//              and the panel-relevant variant list
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// ==============================================================================

use std::collections::BTreeMap;
use std::io::BufRead;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{normalize_chromosome, Variant, VariantType, VcfHeaderInfo, VcfStats};
use crate::panel::RiskPanelRegistry;
use crate::parsers::{Deadline, DEADLINE_CHECK_INTERVAL};
use crate::stats::RunningStats;

/// Default cap on records before the result is marked sampled
pub const DEFAULT_RECORD_CAP: u64 = 50_000;

/// Skipped-line ratio that aborts parsing
pub const DEFAULT_MAX_ERROR_RATIO: f64 = 0.20;

/// Lines that must be seen before the error ratio is enforced
const ERROR_RATIO_MIN_LINES: u64 = 10;

/// Variants kept in the stats preview
const PREVIEW_LIMIT: usize = 5;

const MANDATORY_COLUMNS: [&str; 8] = [
    "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO",
];

/// VCF parsing errors
#[derive(Error, Debug)]
pub enum VcfParseError {
    #[error("Malformed VCF header: {0}")]
    MalformedHeader(String),

    #[error("Malformed VCF file: {0}")]
    MalformedFile(String),

    #[error("VCF file contains no data lines")]
    EmptyFile,

    #[error("Deadline expired before any record was parsed")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Parsed output: finalized statistics plus the panel-relevant variants
#[derive(Debug, Clone)]
pub struct VcfAnalysis {
    pub stats: VcfStats,
    pub matched: Vec<Variant>,
}

/// Streaming VCF analyzer
///
/// Keeps O(1) memory regardless of file size: quality statistics run through
/// a Welford accumulator, histograms are bounded by chromosome/type counts,
/// and only variants hitting a registered risk panel are retained.
pub struct VcfAnalyzer<'a> {
    registry: &'a RiskPanelRegistry,
    record_cap: u64,
    max_error_ratio: f64,
}

impl<'a> VcfAnalyzer<'a> {
    pub fn new(registry: &'a RiskPanelRegistry) -> Self {
        Self {
            registry,
            record_cap: DEFAULT_RECORD_CAP,
            max_error_ratio: DEFAULT_MAX_ERROR_RATIO,
        }
    }

    /// Override the sampling cap (records past it still feed the aggregates)
    pub fn with_record_cap(mut self, cap: u64) -> Self {
        self.record_cap = cap;
        self
    }

    pub fn with_max_error_ratio(mut self, ratio: f64) -> Self {
        self.max_error_ratio = ratio;
        self
    }

    /// Parse a VCF byte stream in a single pass
    ///
    /// # Arguments
    /// * `reader` - decompressed VCF text
    /// * `deadline` - optional processing deadline; on mid-parse expiry the
    ///   accumulated statistics are finalized (`sampled`/`timed_out` set)
    ///   instead of being discarded
    pub fn parse<R: BufRead>(
        &self,
        reader: R,
        deadline: &Deadline,
    ) -> Result<VcfAnalysis, VcfParseError> {
        let mut header = VcfHeaderInfo::default();
        let mut column_header_seen = false;

        let mut total_variants: u64 = 0;
        let mut lines_seen: u64 = 0;
        let mut skipped_lines: u64 = 0;
        let mut quality = RunningStats::new();
        let mut high_quality_variants: u64 = 0;
        let mut chromosome_distribution: BTreeMap<String, u64> = BTreeMap::new();
        let mut variant_types = crate::models::VariantTypeCounts::default();
        let mut preview: Vec<Variant> = Vec::new();
        let mut matched: Vec<Variant> = Vec::new();
        let mut timed_out = false;

        for line_result in reader.lines() {
            let line = line_result?;
            let trimmed = line.trim_end();

            if trimmed.is_empty() {
                continue;
            }

            if let Some(meta) = trimmed.strip_prefix("##") {
                parse_meta_line(meta, &mut header);
                continue;
            }

            if trimmed.starts_with('#') {
                validate_column_header(trimmed)?;
                column_header_seen = true;
                continue;
            }

            if !column_header_seen {
                return Err(VcfParseError::MalformedHeader(
                    "data line before the mandatory #CHROM column header".to_string(),
                ));
            }

            lines_seen += 1;

            match parse_data_line(trimmed) {
                Some(variant) => {
                    total_variants += 1;

                    *chromosome_distribution
                        .entry(variant.chromosome.clone())
                        .or_insert(0) += 1;
                    variant_types.record(variant.variant_type);

                    if let Some(q) = variant.quality {
                        quality.push(q);
                        if q >= 30.0 {
                            high_quality_variants += 1;
                        }
                    }

                    if preview.len() < PREVIEW_LIMIT {
                        preview.push(variant.clone());
                    }

                    if self.is_panel_relevant(&variant) {
                        matched.push(variant);
                    }
                }
                None => {
                    skipped_lines += 1;
                    if lines_seen >= ERROR_RATIO_MIN_LINES
                        && skipped_lines as f64 > self.max_error_ratio * lines_seen as f64
                    {
                        return Err(VcfParseError::MalformedFile(format!(
                            "{skipped_lines} of {lines_seen} lines unparseable"
                        )));
                    }
                }
            }

            if lines_seen % DEADLINE_CHECK_INTERVAL == 0 && deadline.expired() {
                warn!(lines_seen, "deadline expired mid-parse, keeping partial statistics");
                timed_out = true;
                break;
            }
        }

        // Small files never hit the in-loop ratio guard
        if lines_seen > 0 && skipped_lines as f64 > self.max_error_ratio * lines_seen as f64 {
            return Err(VcfParseError::MalformedFile(format!(
                "{skipped_lines} of {lines_seen} lines unparseable"
            )));
        }

        if total_variants == 0 {
            if timed_out {
                return Err(VcfParseError::Timeout);
            }
            if !column_header_seen {
                return Err(VcfParseError::MalformedHeader(
                    "missing mandatory #CHROM column header".to_string(),
                ));
            }
            return Err(VcfParseError::EmptyFile);
        }

        let sampled = timed_out || total_variants > self.record_cap;

        debug!(
            total_variants,
            skipped_lines,
            matched = matched.len(),
            sampled,
            "VCF parse complete"
        );

        Ok(VcfAnalysis {
            stats: VcfStats {
                total_variants,
                skipped_lines,
                header,
                chromosome_distribution,
                variant_types,
                quality: quality.summary(),
                high_quality_variants,
                preview,
                sampled,
                timed_out,
            },
            matched,
        })
    }

    /// O(1) relevance test against the registry's rsID and locus indexes
    fn is_panel_relevant(&self, variant: &Variant) -> bool {
        if let Some(id) = &variant.id {
            if self.registry.contains_rsid(id) {
                return true;
            }
        }
        self.registry
            .contains_locus(&variant.chromosome, variant.position)
    }
}

fn parse_meta_line(meta: &str, header: &mut VcfHeaderInfo) {
    if let Some(version) = meta.strip_prefix("fileformat=") {
        header.format_version = Some(version.to_string());
    } else if let Some(reference) = meta.strip_prefix("reference=") {
        header.reference_genome = Some(reference.to_string());
    }
}

/// The column header must carry the 8 mandatory columns, in order
fn validate_column_header(line: &str) -> Result<(), VcfParseError> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < MANDATORY_COLUMNS.len() {
        return Err(VcfParseError::MalformedHeader(format!(
            "expected {} mandatory columns, found {}",
            MANDATORY_COLUMNS.len(),
            columns.len()
        )));
    }
    for (expected, actual) in MANDATORY_COLUMNS.iter().zip(columns.iter()) {
        if expected != actual {
            return Err(VcfParseError::MalformedHeader(format!(
                "expected column '{expected}', found '{actual}'"
            )));
        }
    }
    Ok(())
}

/// Parse one data line into a Variant; None means the line is skipped
///
/// Wrong column count and non-numeric POS are per-line errors. A QUAL that
/// fails to parse is treated as unknown quality, not a line error.
fn parse_data_line(line: &str) -> Option<Variant> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return None;
    }

    let position: u64 = fields[1].parse().ok()?;
    let chromosome = normalize_chromosome(fields[0]);

    let id = match fields[2] {
        "." | "" => None,
        other => Some(other.to_string()),
    };

    let reference = fields[3].to_string();
    let alternate: Vec<String> = fields[4].split(',').map(|a| a.to_string()).collect();

    let quality = match fields[5] {
        "." | "" => None,
        other => other.parse::<f64>().ok(),
    };

    let variant_type = VariantType::classify(&reference, &alternate);

    Some(Variant {
        chromosome,
        position,
        id,
        reference,
        alternate,
        quality,
        variant_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "##fileformat=VCFv4.2\n##reference=GRCh37\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

    fn analyze(content: &str) -> Result<VcfAnalysis, VcfParseError> {
        let registry = RiskPanelRegistry::builtin();
        VcfAnalyzer::new(&registry).parse(Cursor::new(content.to_string()), &Deadline::none())
    }

    fn data_line(chrom: &str, pos: u64, id: &str, rf: &str, alt: &str, qual: &str) -> String {
        format!("{chrom}\t{pos}\t{id}\t{rf}\t{alt}\t{qual}\tPASS\t.\n")
    }

    #[test]
    fn test_basic_parse_and_metadata() {
        let mut content = HEADER.to_string();
        content.push_str(&data_line("chr1", 100, "rs1", "A", "G", "45.0"));
        content.push_str(&data_line("2", 200, ".", "A", "AGG", "."));

        let analysis = analyze(&content).unwrap();
        let stats = analysis.stats;

        assert_eq!(stats.total_variants, 2);
        assert_eq!(stats.header.format_version.as_deref(), Some("VCFv4.2"));
        assert_eq!(stats.header.reference_genome.as_deref(), Some("GRCh37"));
        assert_eq!(stats.chromosome_distribution["1"], 1);
        assert_eq!(stats.chromosome_distribution["2"], 1);
        assert_eq!(stats.variant_types.snv, 1);
        assert_eq!(stats.variant_types.insertion, 1);

        // "." QUAL is excluded from the accumulator but the record counts
        assert_eq!(stats.quality.count, 1);
        assert!((stats.quality.mean - 45.0).abs() < 1e-12);
        assert!(!stats.sampled);
    }

    #[test]
    fn test_type_counts_match_total() {
        let mut content = HEADER.to_string();
        content.push_str(&data_line("1", 1, ".", "A", "G", "50"));
        content.push_str(&data_line("1", 2, ".", "AC", "A", "50"));
        content.push_str(&data_line("1", 3, ".", "A", "G,T", "50"));
        content.push_str(&data_line("1", 4, ".", "A", "ACGT", "50"));
        content.push_str(&data_line("1", 5, ".", "AT", "GC", "50"));

        let stats = analyze(&content).unwrap().stats;
        assert_eq!(stats.variant_types.total(), stats.total_variants);
        assert_eq!(stats.variant_types.complex, 2);
    }

    #[test]
    fn test_panel_matching_by_rsid_and_locus() {
        let mut content = HEADER.to_string();
        content.push_str(&data_line("10", 114758349, "rs7903146", "C", "T", "99"));
        // No rsID: matches the alzheimer APOE locus by chromosome+position
        content.push_str(&data_line("chr19", 45411941, ".", "T", "C", "99"));
        content.push_str(&data_line("1", 55, "rs_unknown", "A", "G", "99"));

        let analysis = analyze(&content).unwrap();
        assert_eq!(analysis.matched.len(), 2);
        assert_eq!(analysis.matched[0].id.as_deref(), Some("rs7903146"));
        assert_eq!(analysis.matched[1].chromosome, "19");
    }

    #[test]
    fn test_missing_column_header_fails() {
        let content = "##fileformat=VCFv4.2\n1\t100\trs1\tA\tG\t50\tPASS\t.\n";
        let err = analyze(content).unwrap_err();
        assert!(matches!(err, VcfParseError::MalformedHeader(_)));
    }

    #[test]
    fn test_incomplete_column_header_fails() {
        let content = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\n1\t100\trs1\tA\tG\t50\tPASS\t.\n";
        let err = analyze(content).unwrap_err();
        assert!(matches!(err, VcfParseError::MalformedHeader(_)));
    }

    #[test]
    fn test_empty_file() {
        let err = analyze(HEADER).unwrap_err();
        assert!(matches!(err, VcfParseError::EmptyFile));
    }

    #[test]
    fn test_malformed_lines_skipped_below_threshold() {
        let mut content = HEADER.to_string();
        for pos in 1..=18u64 {
            content.push_str(&data_line("1", pos, ".", "A", "G", "50"));
        }
        content.push_str("1\tnot_a_number\t.\tA\tG\t50\tPASS\t.\n");
        content.push_str("too\tfew\tcolumns\n");

        let stats = analyze(&content).unwrap().stats;
        assert_eq!(stats.total_variants, 18);
        assert_eq!(stats.skipped_lines, 2);
    }

    #[test]
    fn test_error_ratio_aborts() {
        let mut content = HEADER.to_string();
        for pos in 1..=10u64 {
            content.push_str(&data_line("1", pos, ".", "A", "G", "50"));
        }
        // 5 bad lines out of 15 seen crosses the 20% threshold
        for _ in 0..5 {
            content.push_str("garbage line without tabs\n");
        }

        let err = analyze(&content).unwrap_err();
        assert!(matches!(err, VcfParseError::MalformedFile(_)));
    }

    #[test]
    fn test_sampling_cap_marks_sampled() {
        let registry = RiskPanelRegistry::builtin();
        let analyzer = VcfAnalyzer::new(&registry).with_record_cap(50);

        let mut content = HEADER.to_string();
        for pos in 1..=120u64 {
            content.push_str(&data_line("1", pos, ".", "A", "G", "50"));
        }
        content.push_str(&data_line("10", 114758349, "rs7903146", "C", "T", "99"));

        let analysis = analyzer
            .parse(Cursor::new(content), &Deadline::none())
            .unwrap();
        assert!(analysis.stats.sampled);
        // Aggregates cover every record even past the cap
        assert_eq!(analysis.stats.total_variants, 121);
        // The variant list stays bounded by panel hits
        assert_eq!(analysis.matched.len(), 1);
    }

    #[test]
    fn test_non_numeric_qual_treated_as_unknown() {
        let mut content = HEADER.to_string();
        content.push_str(&data_line("1", 1, ".", "A", "G", "abc"));
        content.push_str(&data_line("1", 2, ".", "A", "G", "10"));

        let stats = analyze(&content).unwrap().stats;
        assert_eq!(stats.total_variants, 2);
        assert_eq!(stats.quality.count, 1);
    }
}
