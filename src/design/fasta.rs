//! Normalisation of free-form sequence text into FASTA.
//!
//! Callers may paste a bare nucleotide string, a string broken up by
//! whitespace, or a complete FASTA record. The external tools only accept a
//! FASTA file, so everything is coerced into one here.

use super::error::{DesignError, DesignResult};

/// Marker that starts a FASTA header line.
pub const HEADER_MARKER: char = '>';

/// Header used when the input is a bare sequence.
pub const DEFAULT_HEADER: &str = "sequence_1";

/// Column width for wrapped sequence lines.
pub const LINE_WIDTH: usize = 60;

/// Converts raw input text into canonical FASTA.
///
/// Text that already starts with a header is passed through, trimmed and
/// terminated by exactly one newline. Anything else is treated as a single
/// bare sequence: whitespace is removed, the residues are wrapped at
/// [`LINE_WIDTH`] columns and a `>sequence_1` header is prepended.
///
/// The sequence alphabet is not checked.
///
/// # Errors
///
/// Returns [`DesignError::EmptyInput`] if the text is empty or whitespace only.
pub fn normalize(raw: &str) -> DesignResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DesignError::EmptyInput);
    }

    if trimmed.starts_with(HEADER_MARKER) {
        return Ok(format!("{trimmed}\n"));
    }

    let residues: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

    let mut fasta = String::with_capacity(residues.len() + residues.len() / LINE_WIDTH + 16);
    fasta.push(HEADER_MARKER);
    fasta.push_str(DEFAULT_HEADER);
    fasta.push('\n');
    for line in residues.chunks(LINE_WIDTH) {
        fasta.extend(line);
        fasta.push('\n');
    }

    Ok(fasta)
}
