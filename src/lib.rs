// ==============================================================================
// lib.rs - Genomics Processor Library
// ==============================================================================
// Description: Library interface for genomic ingestion and risk scoring modules
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================

pub mod detector;
pub mod error;
pub mod models;
pub mod panel;
pub mod parsers;
pub mod pipeline;
pub mod prs;
pub mod quality;
pub mod stats;

pub use error::ProcessingError;
pub use pipeline::GenomicProcessor;
