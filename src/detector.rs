// ==============================================================================
// detector.rs - Genomic File Format Detection
// ==============================================================================
// Description: Classifies an input byte stream as VCF, FASTQ or Unknown and
//              detects gzip framing from magic bytes
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Rule priority: gzip magic (1F 8B) -> filename extension -> content sniff.
// Detection never guesses: anything unrecognized is FileType::Unknown and the
// pipeline fails fast with UnsupportedFormat.
// ==============================================================================

use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::models::FileType;

/// Bytes of the input inspected during detection
pub const SNIFF_WINDOW: usize = 4096;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Outcome of format detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub file_type: FileType,
    pub compressed: bool,
}

/// Detect the file format from the first `SNIFF_WINDOW` bytes and the filename
///
/// Gzip-framed input is transparently decompressed (prefix only) and detection
/// recurses exactly once on the inner content with any `.gz` suffix stripped.
pub fn detect(prefix: &[u8], filename: &str) -> Detection {
    if is_gzip(prefix) {
        let inner = decompress_prefix(prefix);
        let inner_name = filename
            .strip_suffix(".gz")
            .or_else(|| filename.strip_suffix(".GZ"))
            .unwrap_or(filename);
        let inner_type = detect_uncompressed(&inner, inner_name);
        debug!(
            filename,
            inner_type = inner_type.as_str(),
            "gzip framing detected"
        );
        return Detection {
            file_type: inner_type,
            compressed: true,
        };
    }

    Detection {
        file_type: detect_uncompressed(prefix, filename),
        compressed: false,
    }
}

pub fn is_gzip(prefix: &[u8]) -> bool {
    prefix.len() >= 2 && prefix[..2] == GZIP_MAGIC
}

fn detect_uncompressed(prefix: &[u8], filename: &str) -> FileType {
    // Extension allowlist, compound-safe (lowercased once)
    let name = filename.to_lowercase();
    if name.ends_with(".vcf") {
        return FileType::Vcf;
    }
    if name.ends_with(".fastq") || name.ends_with(".fq") {
        return FileType::Fastq;
    }

    sniff_content(prefix)
}

/// Content-based detection when the extension is uninformative
fn sniff_content(prefix: &[u8]) -> FileType {
    let text = String::from_utf8_lossy(prefix);
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());

    let first = match lines.next() {
        Some(l) => l,
        None => return FileType::Unknown,
    };

    if first.starts_with("##fileformat=VCF") {
        return FileType::Vcf;
    }

    // FASTQ record shape: @id / sequence / + / quality of equal length
    if first.starts_with('@') {
        if let (Some(seq), Some(plus), Some(qual)) = (lines.next(), lines.next(), lines.next()) {
            if plus.starts_with('+') && !seq.is_empty() && seq.len() == qual.len() {
                return FileType::Fastq;
            }
        }
    }

    FileType::Unknown
}

/// Decompress as much of a (possibly truncated) gzip prefix as possible
///
/// The prefix is a window into a larger stream, so the decoder is expected to
/// hit an early EOF; whatever decompressed bytes were produced are enough for
/// sniffing.
fn decompress_prefix(prefix: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(prefix);
    let mut out = Vec::with_capacity(SNIFF_WINDOW);
    let mut buf = [0u8; 512];

    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                if out.len() >= SNIFF_WINDOW {
                    break;
                }
            }
            Err(_) => break, // truncated mid-stream
        }
    }

    out
}
