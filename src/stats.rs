// ==============================================================================
// stats.rs - Streaming Statistics Accumulators
// ==============================================================================
// Description: Welford online mean/variance and bounded histograms used by
//              the FASTQ and VCF analyzers
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Both parsers are strictly single-pass, so every metric here must be
// updatable in O(1) per record with O(1) memory.
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Welford online accumulator for mean and variance
///
/// Numerically stable for long streams; never buffers observations.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add one observation
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance (divides by n, matching the z-score scaling used
    /// for polygenic score normalization elsewhere in this crate)
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Freeze into a serializable summary
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count,
            mean: self.mean(),
            std_dev: self.std_dev(),
            min: self.min(),
            max: self.max(),
        }
    }
}

/// Read-only view of a finalized accumulator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Histogram over the printable ASCII range, used for per-base quality chars
///
/// Keeping raw byte counts makes the accumulator independent of the Phred
/// encoding offset, which is only known once the whole file has been seen.
#[derive(Debug, Clone)]
pub struct AsciiHistogram {
    counts: [u64; 256],
    total: u64,
}

impl Default for AsciiHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl AsciiHistogram {
    pub fn new() -> Self {
        Self {
            counts: [0; 256],
            total: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.counts[byte as usize] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn min_byte(&self) -> Option<u8> {
        self.counts
            .iter()
            .position(|&c| c > 0)
            .map(|i| i as u8)
    }

    pub fn max_byte(&self) -> Option<u8> {
        self.counts
            .iter()
            .rposition(|&c| c > 0)
            .map(|i| i as u8)
    }

    /// Mean byte value shifted by `offset`
    pub fn mean_shifted(&self, offset: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(b, &c)| b as f64 * c as f64)
            .sum();
        sum / self.total as f64 - offset as f64
    }

    /// Median byte value shifted by `offset` (lower median for even totals)
    pub fn median_shifted(&self, offset: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let target = self.total.div_ceil(2);
        let mut seen = 0u64;
        for (byte, &count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return byte as f64 - offset as f64;
            }
        }
        0.0
    }

    /// Fraction of observations with shifted value at or above `threshold`
    pub fn fraction_at_or_above(&self, offset: u8, threshold: u32) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let cutoff = offset as usize + threshold as usize;
        let above: u64 = self.counts[cutoff.min(256)..].iter().sum();
        above as f64 / self.total as f64
    }
}
