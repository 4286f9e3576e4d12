// ==============================================================================
// parsers/fastq.rs - Streaming FASTQ Analyzer
// ==============================================================================
// Description: Single-pass FASTQ parser computing read-quality, composition
//              and duplication statistics with bounded memory
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Record shape: @id / sequence / +[id] / quality, with sequence and quality
// of equal length. Quality encoding (Phred+33 vs Phred+64) is auto-detected
// from the observed character range at finalization.
// ==============================================================================

use std::collections::HashMap;
use std::io::BufRead;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    BaseQualityStats, DuplicationStats, FastqStats, GcStats, OverrepresentedSequence,
    PhredEncoding,
};
use crate::parsers::{Deadline, DEADLINE_CHECK_INTERVAL};
use crate::stats::{AsciiHistogram, RunningStats};

/// Default cap on reads entering the duplicate-sequence map
pub const DEFAULT_READ_CAP: u64 = 10_000;

/// Cap on distinct sequences tracked by the duplicate map
pub const DEFAULT_MAX_DISTINCT: usize = 100_000;

/// Malformed-record ratio that aborts parsing
pub const DEFAULT_MAX_ERROR_RATIO: f64 = 0.20;

/// Records that must be seen before the error ratio is enforced
const ERROR_RATIO_MIN_RECORDS: u64 = 10;

/// Fraction of hashed reads above which a sequence is overrepresented
const OVERREPRESENTATION_FRACTION: f64 = 0.01;

/// Bases of an overrepresented sequence kept for display
const SEQUENCE_DISPLAY_LIMIT: usize = 50;

const GC_HISTOGRAM_BINS: usize = 20;

/// FASTQ parsing errors
#[derive(Error, Debug)]
pub enum FastqParseError {
    #[error("Malformed FASTQ file: {0}")]
    MalformedFile(String),

    #[error("FASTQ file contains no records")]
    EmptyFile,

    #[error("Deadline expired before any record was parsed")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Streaming FASTQ analyzer
///
/// Reads are discarded after contributing to the accumulators; only the
/// bounded duplicate map and running statistics survive the pass.
pub struct FastqAnalyzer {
    read_cap: u64,
    max_distinct: usize,
    max_error_ratio: f64,
}

impl Default for FastqAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FastqAnalyzer {
    pub fn new() -> Self {
        Self {
            read_cap: DEFAULT_READ_CAP,
            max_distinct: DEFAULT_MAX_DISTINCT,
            max_error_ratio: DEFAULT_MAX_ERROR_RATIO,
        }
    }

    /// Override the duplicate-hashing cap (reads past it still feed the
    /// running statistics and the total)
    pub fn with_read_cap(mut self, cap: u64) -> Self {
        self.read_cap = cap;
        self
    }

    pub fn with_max_distinct(mut self, max: usize) -> Self {
        self.max_distinct = max;
        self
    }

    pub fn with_max_error_ratio(mut self, ratio: f64) -> Self {
        self.max_error_ratio = ratio;
        self
    }

    /// Parse a FASTQ byte stream in a single pass
    pub fn parse<R: BufRead>(
        &self,
        reader: R,
        deadline: &Deadline,
    ) -> Result<FastqStats, FastqParseError> {
        let mut total_reads: u64 = 0;
        let mut records_seen: u64 = 0;
        let mut skipped_records: u64 = 0;
        let mut read_length = RunningStats::new();
        let mut gc_content = RunningStats::new();
        let mut gc_histogram = vec![0u64; GC_HISTOGRAM_BINS];
        let mut quality_hist = AsciiHistogram::new();
        let mut sequence_counts: HashMap<String, u64> = HashMap::new();
        let mut hashed_reads: u64 = 0;
        let mut map_capped = false;
        let mut timed_out = false;

        let mut lines = reader.lines();

        loop {
            // Record header, skipping blank separator lines
            let id_line = loop {
                match lines.next() {
                    Some(Ok(line)) => {
                        if !line.trim().is_empty() {
                            break Some(line);
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break None,
                }
            };

            let id_line = match id_line {
                Some(l) => l,
                None => break,
            };

            let sequence = next_line(&mut lines)?;
            let plus = next_line(&mut lines)?;
            let quality = next_line(&mut lines)?;

            records_seen += 1;

            let well_formed = id_line.starts_with('@')
                && matches!(&plus, Some(p) if p.starts_with('+'))
                && matches!((&sequence, &quality), (Some(s), Some(q)) if s.len() == q.len());

            if !well_formed {
                skipped_records += 1;
                if records_seen >= ERROR_RATIO_MIN_RECORDS
                    && skipped_records as f64 > self.max_error_ratio * records_seen as f64
                {
                    return Err(FastqParseError::MalformedFile(format!(
                        "{skipped_records} of {records_seen} records malformed"
                    )));
                }
                if quality.is_none() {
                    break; // truncated final record
                }
                continue;
            }

            // Both are Some by the well_formed check
            let sequence = sequence.unwrap_or_default();
            let quality = quality.unwrap_or_default();

            total_reads += 1;
            read_length.push(sequence.len() as f64);

            if !sequence.is_empty() {
                let gc = gc_fraction(&sequence);
                gc_content.push(gc);
                let bin = ((gc * GC_HISTOGRAM_BINS as f64) as usize).min(GC_HISTOGRAM_BINS - 1);
                gc_histogram[bin] += 1;
            }

            for &byte in quality.as_bytes() {
                quality_hist.push(byte);
            }

            if total_reads <= self.read_cap {
                hashed_reads += 1;
                if sequence_counts.len() < self.max_distinct
                    || sequence_counts.contains_key(&sequence)
                {
                    *sequence_counts.entry(sequence).or_insert(0) += 1;
                } else {
                    map_capped = true;
                }
            }

            if records_seen % DEADLINE_CHECK_INTERVAL == 0 && deadline.expired() {
                warn!(records_seen, "deadline expired mid-parse, keeping partial statistics");
                timed_out = true;
                break;
            }
        }

        if records_seen > 0 && skipped_records as f64 > self.max_error_ratio * records_seen as f64 {
            return Err(FastqParseError::MalformedFile(format!(
                "{skipped_records} of {records_seen} records malformed"
            )));
        }

        if total_reads == 0 {
            if timed_out {
                return Err(FastqParseError::Timeout);
            }
            return Err(FastqParseError::EmptyFile);
        }

        let base_quality = finalize_quality(&quality_hist)?;
        let duplication =
            finalize_duplication(&sequence_counts, hashed_reads, map_capped);
        let sampled = timed_out || total_reads > self.read_cap;

        debug!(
            total_reads,
            skipped_records,
            mean_phred = base_quality.mean_phred,
            sampled,
            "FASTQ parse complete"
        );

        Ok(FastqStats {
            total_reads,
            skipped_records,
            read_length: read_length.summary(),
            gc_content: GcStats {
                summary: gc_content.summary(),
                histogram: gc_histogram,
            },
            base_quality,
            duplication,
            sampled,
            timed_out,
        })
    }
}

fn next_line(
    lines: &mut std::io::Lines<impl BufRead>,
) -> Result<Option<String>, FastqParseError> {
    match lines.next() {
        Some(Ok(line)) => Ok(Some(line)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Fraction of G/C bases in a read (case-insensitive)
fn gc_fraction(sequence: &str) -> f64 {
    let gc = sequence
        .bytes()
        .filter(|b| matches!(b, b'G' | b'C' | b'g' | b'c'))
        .count();
    gc as f64 / sequence.len() as f64
}

/// Derive Phred statistics from the raw ASCII histogram
///
/// Offset heuristic: Phred+64 only when every observed character is at or
/// above '@' (64); high-quality Phred+33 data above Q31 is theoretically
/// ambiguous and resolves to Phred+33 here, matching common QC tools.
fn finalize_quality(hist: &AsciiHistogram) -> Result<BaseQualityStats, FastqParseError> {
    let (min_byte, max_byte) = match (hist.min_byte(), hist.max_byte()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            // All reads were zero-length; report an empty Phred+33 profile
            return Ok(BaseQualityStats {
                encoding: PhredEncoding::Phred33,
                mean_phred: 0.0,
                median_phred: 0.0,
                min_phred: 0,
                max_phred: 0,
                high_quality_percent: 0.0,
                medium_quality_percent: 0.0,
                low_quality_percent: 0.0,
            });
        }
    };

    if min_byte < b'!' || max_byte > b'~' {
        return Err(FastqParseError::MalformedFile(format!(
            "unrecognized quality encoding (character range {min_byte}-{max_byte})"
        )));
    }

    let encoding = if min_byte >= 64 {
        PhredEncoding::Phred64
    } else {
        PhredEncoding::Phred33
    };
    let offset = encoding.offset();

    let high = hist.fraction_at_or_above(offset, 30);
    let at_least_q20 = hist.fraction_at_or_above(offset, 20);

    Ok(BaseQualityStats {
        encoding,
        mean_phred: hist.mean_shifted(offset),
        median_phred: hist.median_shifted(offset),
        min_phred: min_byte - offset,
        max_phred: max_byte - offset,
        high_quality_percent: high * 100.0,
        medium_quality_percent: (at_least_q20 - high) * 100.0,
        low_quality_percent: (1.0 - at_least_q20) * 100.0,
    })
}

fn finalize_duplication(
    sequence_counts: &HashMap<String, u64>,
    hashed_reads: u64,
    map_capped: bool,
) -> DuplicationStats {
    let unique_sequences = sequence_counts.len() as u64;
    let duplication_rate_percent = if hashed_reads > 0 {
        100.0 * (1.0 - unique_sequences as f64 / hashed_reads as f64)
    } else {
        0.0
    };

    let threshold = (hashed_reads as f64 * OVERREPRESENTATION_FRACTION).max(1.0);
    let mut overrepresented: Vec<OverrepresentedSequence> = sequence_counts
        .iter()
        .filter(|(_, &count)| count > 1 && count as f64 > threshold)
        .map(|(seq, &count)| OverrepresentedSequence {
            sequence: seq.chars().take(SEQUENCE_DISPLAY_LIMIT).collect(),
            count,
            percent: 100.0 * count as f64 / hashed_reads as f64,
        })
        .collect();

    // Deterministic ordering for idempotent results
    overrepresented.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.sequence.cmp(&b.sequence))
    });

    DuplicationStats {
        hashed_reads,
        unique_sequences,
        duplication_rate_percent,
        overrepresented,
        map_capped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn analyze(content: &str) -> Result<FastqStats, FastqParseError> {
        FastqAnalyzer::new().parse(Cursor::new(content.to_string()), &Deadline::none())
    }

    fn record(id: &str, seq: &str, qual: &str) -> String {
        format!("@{id}\n{seq}\n+\n{qual}\n")
    }

    #[test]
    fn test_two_record_file() {
        let mut content = record("read1", "ACGT", "IIII");
        content.push_str(&record("read2", "GGCC", "!!!!"));

        let stats = analyze(&content).unwrap();
        assert_eq!(stats.total_reads, 2);
        assert_eq!(stats.skipped_records, 0);
        assert!((stats.read_length.mean - 4.0).abs() < 1e-12);
        assert!(!stats.sampled);
    }

    #[test]
    fn test_gc_content() {
        // ACGT = 0.5 GC, GGCC = 1.0 GC
        let mut content = record("r1", "ACGT", "IIII");
        content.push_str(&record("r2", "GGCC", "IIII"));

        let stats = analyze(&content).unwrap();
        assert!((stats.gc_content.summary.mean - 0.75).abs() < 1e-12);
        assert_eq!(stats.gc_content.histogram[10], 1); // 0.5 lands in bin 10
        assert_eq!(stats.gc_content.histogram[19], 1); // 1.0 clamps to last bin
    }

    #[test]
    fn test_phred33_statistics() {
        // 'I' is Q40, '5' is Q20 under Phred+33
        let content = record("r1", "ACGT", "II55");
        let stats = analyze(&content).unwrap();

        assert_eq!(stats.base_quality.encoding, PhredEncoding::Phred33);
        assert!((stats.base_quality.mean_phred - 30.0).abs() < 1e-12);
        assert_eq!(stats.base_quality.min_phred, 20);
        assert_eq!(stats.base_quality.max_phred, 40);
        assert!((stats.base_quality.high_quality_percent - 50.0).abs() < 1e-9);
        assert!((stats.base_quality.medium_quality_percent - 50.0).abs() < 1e-9);
        assert!((stats.base_quality.low_quality_percent - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_phred64_detection() {
        // 'h' (104) is Q40 under Phred+64; all bytes >= '@' triggers +64
        let content = record("r1", "ACGT", "hhhh");
        let stats = analyze(&content).unwrap();

        assert_eq!(stats.base_quality.encoding, PhredEncoding::Phred64);
        assert!((stats.base_quality.mean_phred - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_phred_values_within_valid_range() {
        let content = record("r1", "ACGTACGT", "!I5?+~AB");
        let stats = analyze(&content).unwrap();
        // Phred+33 valid range is 0-93
        assert!(stats.base_quality.max_phred <= 93);
        assert_eq!(stats.base_quality.min_phred, 0);
    }

    #[test]
    fn test_length_mismatch_skipped() {
        let mut content = String::new();
        for i in 0..18 {
            content.push_str(&record(&format!("r{i}"), "ACGT", "IIII"));
        }
        content.push_str("@bad\nACGTACGT\n+\nIII\n");

        let stats = analyze(&content).unwrap();
        assert_eq!(stats.total_reads, 18);
        assert_eq!(stats.skipped_records, 1);
    }

    #[test]
    fn test_error_ratio_aborts() {
        let mut content = String::new();
        for i in 0..10 {
            content.push_str(&record(&format!("r{i}"), "ACGT", "IIII"));
        }
        for i in 0..5 {
            content.push_str(&format!("@bad{i}\nACGTACGT\n+\nIII\n"));
        }

        let err = analyze(&content).unwrap_err();
        assert!(matches!(err, FastqParseError::MalformedFile(_)));
    }

    #[test]
    fn test_empty_file() {
        let err = analyze("").unwrap_err();
        assert!(matches!(err, FastqParseError::EmptyFile));

        let err = analyze("\n\n\n").unwrap_err();
        assert!(matches!(err, FastqParseError::EmptyFile));
    }

    #[test]
    fn test_overrepresented_sequence_flagged() {
        let mut content = String::new();
        // 10 identical reads among 40 total: 25% of sample, well over 1%
        for i in 0..10 {
            content.push_str(&record(&format!("dup{i}"), "AAAACCCC", "IIIIIIII"));
        }
        for i in 0..30u32 {
            // Unique reads: encode the index in the last three bases
            let bases = [b'A', b'C', b'G', b'T'];
            let tail: String = (0..3)
                .map(|shift| bases[((i >> (2 * shift)) & 3) as usize] as char)
                .collect();
            let seq = format!("ACGTA{tail}");
            content.push_str(&record(&format!("r{i}"), &seq, &"I".repeat(seq.len())));
        }

        let stats = analyze(&content).unwrap();
        assert!(stats
            .duplication
            .overrepresented
            .iter()
            .any(|o| o.sequence == "AAAACCCC" && o.count == 10));
        assert!(stats.duplication.duplication_rate_percent > 0.0);
    }

    #[test]
    fn test_read_cap_stops_hashing() {
        let analyzer = FastqAnalyzer::new().with_read_cap(5);
        let mut content = String::new();
        for i in 0..12 {
            content.push_str(&record(&format!("r{i}"), "ACGT", "IIII"));
        }

        let stats = analyzer
            .parse(Cursor::new(content), &Deadline::none())
            .unwrap();
        assert_eq!(stats.total_reads, 12);
        assert_eq!(stats.duplication.hashed_reads, 5);
        assert!(stats.sampled);
        // Running statistics still cover every read
        assert_eq!(stats.read_length.count, 12);
    }

    #[test]
    fn test_invalid_quality_characters_rejected() {
        let content = "@r1\nACGT\n+\nI\u{7f}II\n";
        let err = analyze(content).unwrap_err();
        assert!(matches!(err, FastqParseError::MalformedFile(_)));
    }
}
