// ==============================================================================
// models.rs - Genomic Processing Data Models
// ==============================================================================
// Description: Data structures shared across detection, parsing, quality
//              control and polygenic risk scoring
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::stats::StatsSummary;

/// Version of the serialized `ProcessingResult` schema
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Normalize a chromosome name: strip any `chr` prefix, uppercase the rest
///
/// "chr1" -> "1", "chrX" -> "X", "mt" -> "MT". Unrecognized contigs pass
/// through uppercased so the distribution histogram still counts them.
pub fn normalize_chromosome(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("chr")
        .or_else(|| trimmed.strip_prefix("CHR"))
        .or_else(|| trimmed.strip_prefix("Chr"))
        .unwrap_or(trimmed);
    stripped.to_uppercase()
}

/// Detected genomic file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Vcf,
    Fastq,
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Vcf => "VCF",
            FileType::Fastq => "FASTQ",
            FileType::Unknown => "Unknown",
        }
    }
}

/// Variant classification derived from REF/ALT allele lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantType {
    Snv,
    Insertion,
    Deletion,
    Complex,
}

impl VariantType {
    /// Classify a variant from its reference and alternate alleles
    ///
    /// Multi-allelic records are Complex regardless of allele lengths.
    pub fn classify(reference: &str, alternates: &[String]) -> Self {
        if alternates.len() != 1 {
            return VariantType::Complex;
        }
        let alt = alternates[0].len();
        let rf = reference.len();
        if rf == 1 && alt == 1 {
            VariantType::Snv
        } else if alt > rf {
            VariantType::Insertion
        } else if alt < rf {
            VariantType::Deletion
        } else {
            VariantType::Complex
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Snv => "SNV",
            VariantType::Insertion => "Insertion",
            VariantType::Deletion => "Deletion",
            VariantType::Complex => "Complex",
        }
    }
}

/// A single parsed VCF variant
///
/// Only variants relevant to a registered risk panel are retained past the
/// parse; everything else contributes to aggregate statistics and is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Normalized chromosome ("1".."22", "X", "Y", "MT"; no "chr" prefix)
    pub chromosome: String,

    /// 1-based position
    pub position: u64,

    /// rsID if the ID column was populated ("." becomes None)
    pub id: Option<String>,

    /// Reference allele
    pub reference: String,

    /// Alternate allele(s); more than one entry means multi-allelic
    pub alternate: Vec<String>,

    /// Phred-scaled variant quality ("." becomes None)
    pub quality: Option<f64>,

    /// Derived classification
    pub variant_type: VariantType,
}

/// Per-type variant counts
///
/// Invariant: `total()` always equals the number of data lines parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantTypeCounts {
    pub snv: u64,
    pub insertion: u64,
    pub deletion: u64,
    pub complex: u64,
}

impl VariantTypeCounts {
    pub fn record(&mut self, variant_type: VariantType) {
        match variant_type {
            VariantType::Snv => self.snv += 1,
            VariantType::Insertion => self.insertion += 1,
            VariantType::Deletion => self.deletion += 1,
            VariantType::Complex => self.complex += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.snv + self.insertion + self.deletion + self.complex
    }
}

/// Metadata extracted from VCF `##` header lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcfHeaderInfo {
    /// Declared format version (e.g. "VCFv4.2")
    pub format_version: Option<String>,

    /// Declared reference genome, if any
    pub reference_genome: Option<String>,
}

/// Finalized aggregate statistics for a VCF input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcfStats {
    /// Total data lines successfully parsed (includes records past the
    /// sampling cap)
    pub total_variants: u64,

    /// Data lines skipped as unparseable
    pub skipped_lines: u64,

    pub header: VcfHeaderInfo,

    /// Chromosome -> variant count (BTreeMap for deterministic serialization)
    pub chromosome_distribution: BTreeMap<String, u64>,

    pub variant_types: VariantTypeCounts,

    /// QUAL statistics over variants that carry a quality value; records with
    /// "." still count toward `total_variants` but not here
    pub quality: StatsSummary,

    /// Variants with QUAL >= 30 (among quality-bearing variants)
    pub high_quality_variants: u64,

    /// First few variants seen, for display purposes
    pub preview: Vec<Variant>,

    pub sampled: bool,
    pub timed_out: bool,
}

/// Detected Phred quality encoding of a FASTQ file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhredEncoding {
    #[serde(rename = "phred+33")]
    Phred33,
    #[serde(rename = "phred+64")]
    Phred64,
}

impl PhredEncoding {
    pub fn offset(&self) -> u8 {
        match self {
            PhredEncoding::Phred33 => 33,
            PhredEncoding::Phred64 => 64,
        }
    }
}

/// Per-base quality statistics derived from the ASCII quality histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseQualityStats {
    pub encoding: PhredEncoding,
    pub mean_phred: f64,
    pub median_phred: f64,
    pub min_phred: u8,
    pub max_phred: u8,
    /// Percent of bases at Q30 or above
    pub high_quality_percent: f64,
    /// Percent of bases in [Q20, Q30)
    pub medium_quality_percent: f64,
    /// Percent of bases below Q20
    pub low_quality_percent: f64,
}

/// GC-content distribution across reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcStats {
    /// Per-read GC fraction (0.0-1.0) running statistics
    pub summary: StatsSummary,
    /// 20 equal-width bins over [0, 1]
    pub histogram: Vec<u64>,
}

/// A sequence appearing in more than 1% of hashed reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrepresentedSequence {
    /// First 50 bp of the sequence
    pub sequence: String,
    pub count: u64,
    pub percent: f64,
}

/// Exact-duplicate statistics over the hashed read sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicationStats {
    /// Reads that entered the duplicate map (bounded by the sampling cap)
    pub hashed_reads: u64,
    pub unique_sequences: u64,
    pub duplication_rate_percent: f64,
    pub overrepresented: Vec<OverrepresentedSequence>,
    /// True if the distinct-sequence map hit its size cap
    pub map_capped: bool,
}

/// Finalized aggregate statistics for a FASTQ input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastqStats {
    /// Total well-formed records seen (includes reads past the sampling cap)
    pub total_reads: u64,

    /// Records skipped as malformed (sequence/quality length mismatch)
    pub skipped_records: u64,

    pub read_length: StatsSummary,
    pub gc_content: GcStats,
    pub base_quality: BaseQualityStats,
    pub duplication: DuplicationStats,

    pub sampled: bool,
    pub timed_out: bool,
}

/// Format-specific aggregate statistics, tagged for serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "file_type")]
pub enum AggregateStats {
    #[serde(rename = "VCF")]
    Vcf(VcfStats),
    #[serde(rename = "FASTQ")]
    Fastq(FastqStats),
}

impl AggregateStats {
    pub fn records_processed(&self) -> u64 {
        match self {
            AggregateStats::Vcf(s) => s.total_variants,
            AggregateStats::Fastq(s) => s.total_reads,
        }
    }

    pub fn sampled(&self) -> bool {
        match self {
            AggregateStats::Vcf(s) => s.sampled,
            AggregateStats::Fastq(s) => s.sampled,
        }
    }

    pub fn timed_out(&self) -> bool {
        match self {
            AggregateStats::Vcf(s) => s.timed_out,
            AggregateStats::Fastq(s) => s.timed_out,
        }
    }
}

/// Overall quality rating from threshold rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityRating {
    Excellent,
    Good,
    Poor,
}

/// Category tag attached to each quality issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCategory {
    BaseQuality,
    VariantQuality,
    Duplication,
    ParseErrors,
    Coverage,
}

/// A single quality-control finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub message: String,
}

/// Pass/fail verdict with findings and suggested next steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub rating: QualityRating,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
}

/// Deterministic risk band derived from the normalized score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    /// Threshold rule: < 0.50 Low, < 0.70 Moderate, else High
    pub fn from_score(normalized: f64) -> Self {
        if normalized < 0.50 {
            RiskCategory::Low
        } else if normalized < 0.70 {
            RiskCategory::Moderate
        } else {
            RiskCategory::High
        }
    }
}

/// Polygenic risk score for one disease
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrsResult {
    pub disease: String,

    /// Sum of matched effect sizes (signed; negative alleles are protective)
    pub raw_score: f64,

    /// Min-max normalized score in [0, 1], centered on 0.5
    pub normalized_score: f64,

    pub risk_category: RiskCategory,

    /// Approximate population percentile (0-100), distribution-dependent
    pub percentile: u8,

    /// Panel entries matched with risk-allele agreement
    pub matched_count: usize,

    /// Total entries in the disease panel
    pub panel_size: usize,

    /// True when zero panel variants were found and the population-average
    /// default (0.5) was substituted; never silently equivalent to a match
    pub fallback: bool,
}

/// Per-disease scoring outcome
///
/// A corrupt panel fails only its own disease tag; the rest of the run is
/// unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiseaseRisk {
    Scored(PrsResult),
    Errored { disease: String, message: String },
}

/// The sole output of a pipeline run
///
/// Deterministic for identical input bytes; carries no wall-clock fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub schema_version: u32,
    pub file_type: FileType,
    pub compressed: bool,
    pub stats: AggregateStats,
    pub quality: QualityVerdict,
    pub matched_variants: Vec<Variant>,
    pub prs: Vec<DiseaseRisk>,
    pub sampled: bool,
    pub timed_out: bool,
    pub records_processed: u64,
    /// SHA-256 of the raw input bytes as consumed (before decompression)
    pub input_sha256: String,
}
