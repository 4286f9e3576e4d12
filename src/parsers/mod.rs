// ==============================================================================
// parsers/mod.rs - Genomic file parser modules
// ==============================================================================
// Description: Streaming analyzers for VCF and FASTQ byte streams
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================

use std::time::{Duration, Instant};

pub mod fastq;
pub mod vcf;

pub use fastq::{FastqAnalyzer, FastqParseError};
pub use vcf::{VcfAnalysis, VcfAnalyzer, VcfParseError};

/// Records between deadline checks inside the parse loops
pub const DEADLINE_CHECK_INTERVAL: u64 = 1_000;

/// Optional processing deadline threaded through the parsers
///
/// Checked every `DEADLINE_CHECK_INTERVAL` records so the elapsed-time call
/// stays off the per-record hot path.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + duration),
        }
    }

    pub fn from_limit(limit: Option<Duration>) -> Self {
        match limit {
            Some(d) => Self::after(d),
            None => Self::none(),
        }
    }

    pub fn expired(&self) -> bool {
        match self.expires_at {
            Some(t) => Instant::now() >= t,
            None => false,
        }
    }
}
