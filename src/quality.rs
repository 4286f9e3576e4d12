// ==============================================================================
// quality.rs - Quality Control Verdicts
// ==============================================================================
// Description: Threshold rules turning finalized aggregate statistics into
//              a pass/fail verdict with issues and recommendations
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Pure functions over finalized statistics. No IO, no side effects, so every
// rule is unit-testable against synthetic stats objects.
// ==============================================================================

use tracing::debug;

use crate::models::{
    AggregateStats, FastqStats, Issue, IssueCategory, QualityRating, QualityVerdict, VcfStats,
};

/// Mean quality at or above which a file can rate Excellent
const EXCELLENT_MEAN_QUALITY: f64 = 30.0;

/// Mean quality at or above which a file rates at least Good
const GOOD_MEAN_QUALITY: f64 = 20.0;

/// Fraction of VCF variants that must reach QUAL 30 for Excellent
const EXCELLENT_HIGH_QUALITY_FRACTION: f64 = 0.95;

/// FASTQ duplication rate (percent) that blocks an Excellent rating
const EXCELLENT_MAX_DUPLICATION_PERCENT: f64 = 20.0;

/// Quality controller over finalized statistics
pub struct QualityController;

impl QualityController {
    /// Evaluate either analyzer's output
    pub fn evaluate(stats: &AggregateStats) -> QualityVerdict {
        let verdict = match stats {
            AggregateStats::Vcf(vcf) => evaluate_vcf(vcf),
            AggregateStats::Fastq(fastq) => evaluate_fastq(fastq),
        };
        debug!(rating = ?verdict.rating, issues = verdict.issues.len(), "quality verdict");
        verdict
    }
}

fn evaluate_vcf(stats: &VcfStats) -> QualityVerdict {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let mean_qual = stats.quality.mean;
    // Fraction is over quality-bearing variants; "." QUAL records are
    // excluded from the accumulator and must not drag the ratio down
    let high_quality_fraction = if stats.quality.count > 0 {
        stats.high_quality_variants as f64 / stats.quality.count as f64
    } else {
        0.0
    };

    let rating = if mean_qual >= EXCELLENT_MEAN_QUALITY
        && high_quality_fraction >= EXCELLENT_HIGH_QUALITY_FRACTION
    {
        QualityRating::Excellent
    } else if mean_qual >= GOOD_MEAN_QUALITY {
        QualityRating::Good
    } else {
        QualityRating::Poor
    };

    if mean_qual < GOOD_MEAN_QUALITY {
        issues.push(Issue {
            category: IssueCategory::VariantQuality,
            message: format!(
                "Mean variant quality {mean_qual:.1} is below the minimum of {GOOD_MEAN_QUALITY}"
            ),
        });
        recommendations
            .push("Filter variants below QUAL 20 before downstream analysis".to_string());
    } else if mean_qual < EXCELLENT_MEAN_QUALITY {
        issues.push(Issue {
            category: IssueCategory::VariantQuality,
            message: format!(
                "Mean variant quality {mean_qual:.1} is below the Excellent threshold of {EXCELLENT_MEAN_QUALITY}"
            ),
        });
        recommendations.push("Re-sequence low-quality regions to improve call confidence".to_string());
    } else if high_quality_fraction < EXCELLENT_HIGH_QUALITY_FRACTION {
        issues.push(Issue {
            category: IssueCategory::VariantQuality,
            message: format!(
                "Only {:.1}% of variants reach QUAL 30 (95% required for Excellent)",
                high_quality_fraction * 100.0
            ),
        });
        recommendations.push("Re-sequence low-quality regions to improve call confidence".to_string());
    }

    if stats.skipped_lines > 0 {
        issues.push(Issue {
            category: IssueCategory::ParseErrors,
            message: format!(
                "{} malformed data lines were skipped during parsing",
                stats.skipped_lines
            ),
        });
    }

    if stats.timed_out {
        issues.push(Issue {
            category: IssueCategory::Coverage,
            message: "Processing deadline expired; statistics cover a partial scan of the file"
                .to_string(),
        });
    } else if stats.sampled {
        issues.push(Issue {
            category: IssueCategory::Coverage,
            message: "Record count exceeded the sampling cap; detailed statistics cover a sample"
                .to_string(),
        });
    }

    QualityVerdict {
        rating,
        issues,
        recommendations,
    }
}

fn evaluate_fastq(stats: &FastqStats) -> QualityVerdict {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let mean_phred = stats.base_quality.mean_phred;
    let duplication = stats.duplication.duplication_rate_percent;

    let rating = if mean_phred >= EXCELLENT_MEAN_QUALITY
        && duplication < EXCELLENT_MAX_DUPLICATION_PERCENT
    {
        QualityRating::Excellent
    } else if mean_phred >= GOOD_MEAN_QUALITY {
        QualityRating::Good
    } else {
        QualityRating::Poor
    };

    if mean_phred < GOOD_MEAN_QUALITY {
        issues.push(Issue {
            category: IssueCategory::BaseQuality,
            message: format!(
                "Mean base quality Q{mean_phred:.1} is below the minimum of Q{GOOD_MEAN_QUALITY}"
            ),
        });
        recommendations.push("Re-sequence low-quality regions".to_string());
    } else if mean_phred < EXCELLENT_MEAN_QUALITY {
        issues.push(Issue {
            category: IssueCategory::BaseQuality,
            message: format!(
                "Mean base quality Q{mean_phred:.1} is below the Excellent threshold of Q{EXCELLENT_MEAN_QUALITY}"
            ),
        });
        recommendations.push("Quality-trim read ends before alignment".to_string());
    }

    if duplication >= EXCELLENT_MAX_DUPLICATION_PERCENT {
        issues.push(Issue {
            category: IssueCategory::Duplication,
            message: format!(
                "Duplication rate {duplication:.1}% is at or above {EXCELLENT_MAX_DUPLICATION_PERCENT}%"
            ),
        });
        recommendations.push("Deduplicate reads or review library complexity".to_string());
    }

    if !stats.duplication.overrepresented.is_empty() {
        issues.push(Issue {
            category: IssueCategory::Duplication,
            message: format!(
                "{} overrepresented sequence(s) exceed 1% of sampled reads",
                stats.duplication.overrepresented.len()
            ),
        });
    }

    if stats.skipped_records > 0 {
        issues.push(Issue {
            category: IssueCategory::ParseErrors,
            message: format!(
                "{} malformed records were skipped during parsing",
                stats.skipped_records
            ),
        });
    }

    if stats.timed_out {
        issues.push(Issue {
            category: IssueCategory::Coverage,
            message: "Processing deadline expired; statistics cover a partial scan of the file"
                .to_string(),
        });
    } else if stats.sampled {
        issues.push(Issue {
            category: IssueCategory::Coverage,
            message: "Read count exceeded the sampling cap; duplication statistics cover a sample"
                .to_string(),
        });
    }

    QualityVerdict {
        rating,
        issues,
        recommendations,
    }
}
