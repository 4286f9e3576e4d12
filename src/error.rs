// ==============================================================================
// error.rs - Processing Error Taxonomy
// ==============================================================================
// Description: Typed error kinds returned by the genomic processing pipeline
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Propagation policy: per-record parse errors are recovered locally (skipped
// and counted) up to a 20% threshold; crossing it escalates to MalformedFile.
// Scoring failures are isolated per disease tag (see prs.rs) and never abort
// the run. Everything else is fatal and surfaced to the caller unchanged.
// ==============================================================================

use thiserror::Error;

use crate::parsers::{FastqParseError, VcfParseError};

/// Fatal errors surfaced by `GenomicProcessor::process`
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The input matched no known genomic file format
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The input contained no data records
    #[error("File contains no data records")]
    EmptyFile,

    /// A mandatory header (e.g. the VCF #CHROM column line) was missing or invalid
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Too many unparseable records (skipped-line ratio exceeded the threshold)
    #[error("Malformed file: {0}")]
    MalformedFile(String),

    /// The processing deadline expired before any record could be parsed
    #[error("Processing deadline exceeded")]
    Timeout,

    /// No risk panel is registered for the requested disease tag (or the
    /// registry is empty at pipeline construction)
    #[error("Risk panel not found: {0}")]
    PanelNotFound(String),

    /// Unexpected parser or I/O fault
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ProcessingError {
    fn from(e: std::io::Error) -> Self {
        ProcessingError::InternalError(format!("I/O error: {e}"))
    }
}

impl From<VcfParseError> for ProcessingError {
    fn from(e: VcfParseError) -> Self {
        match e {
            VcfParseError::MalformedHeader(msg) => ProcessingError::MalformedHeader(msg),
            VcfParseError::MalformedFile(msg) => ProcessingError::MalformedFile(msg),
            VcfParseError::EmptyFile => ProcessingError::EmptyFile,
            VcfParseError::Timeout => ProcessingError::Timeout,
            VcfParseError::IoError(io) => io.into(),
        }
    }
}

impl From<FastqParseError> for ProcessingError {
    fn from(e: FastqParseError) -> Self {
        match e {
            FastqParseError::MalformedFile(msg) => ProcessingError::MalformedFile(msg),
            FastqParseError::EmptyFile => ProcessingError::EmptyFile,
            FastqParseError::Timeout => ProcessingError::Timeout,
            FastqParseError::IoError(io) => io.into(),
        }
    }
}
