//! Text weight dump parser
//!
//! Parses the line-oriented text serialization of trained network weights:
//! line 1 is a base-10 version integer, every following line is one flat
//! weight vector as space-separated decimal floats.
//!
//! Every value is truncated to bfloat16 precision at parse time by masking
//! the low 16 bits of its IEEE-754 bit pattern to zero. This is a
//! deterministic truncation, not a rounding conversion: downstream consumers
//! expect the exact bit patterns this scheme produces, so the truncated
//! float and its 16-bit code must agree bit-for-bit.
//!
//! Line termination is explicit: lines come from [`str::lines`], so a file
//! ending in a single `\n` yields no phantom vector, and one trailing blank
//! line is discarded. A blank line anywhere else is a format error.

use std::fs;
use std::path::Path;

use half::bf16;

use crate::error::{ConvertirError, Result};
use crate::net::{WeightStack, WeightVector};

/// Truncate a float to bfloat16 precision, keeping the f32 representation.
///
/// Masks the low 16 mantissa bits to zero. Idempotent: truncating an
/// already-truncated value is a no-op.
#[must_use]
pub fn truncate_f32(v: f32) -> f32 {
    f32::from_bits(v.to_bits() & 0xFFFF_0000)
}

/// The 16-bit truncated code for a float: the upper half of its bit pattern.
///
/// The code is a valid bfloat16 bit pattern, so it is carried as [`bf16`].
/// Widening it back to f32 is exact and reproduces [`truncate_f32`] of the
/// original value.
#[must_use]
pub fn bf16_code(v: f32) -> bf16 {
    bf16::from_bits((v.to_bits() >> 16) as u16)
}

/// Parse a weight dump from a string.
///
/// # Returns
///
/// The version integer from line 1 and the weight vectors from every
/// following line, in file order.
///
/// # Errors
///
/// Returns `FormatError` if the version line is missing or non-numeric, if
/// any weight token fails to parse as a decimal float, or if a blank line
/// appears anywhere but the very end of the input.
pub fn parse_text(text: &str) -> Result<(u32, WeightStack)> {
    let mut lines = text.lines().enumerate();

    let (_, version_line) = lines.next().ok_or_else(|| ConvertirError::FormatError {
        reason: "empty input: missing version line".to_string(),
    })?;
    let version: u32 =
        version_line
            .trim()
            .parse()
            .map_err(|_| ConvertirError::FormatError {
                reason: format!("line 1: invalid version {version_line:?}"),
            })?;

    let mut rows: Vec<WeightVector> = Vec::new();
    let mut blank_line = None;
    for (idx, line) in lines {
        if line.is_empty() {
            // Tolerated only as the final line; flagged if anything follows.
            blank_line = Some(idx + 1);
            continue;
        }
        if let Some(n) = blank_line.take() {
            return Err(ConvertirError::FormatError {
                reason: format!("line {n}: unexpected blank line"),
            });
        }
        rows.push(parse_row(idx + 1, line)?);
    }

    Ok((version, WeightStack::new(rows)))
}

/// Read and parse a weight dump file.
///
/// The whole file is read into memory before parsing; the dumps are bounded
/// by model size and there is no streaming requirement.
///
/// # Errors
///
/// Returns `IoError` if the file cannot be read, or any [`parse_text`]
/// error.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<(u32, WeightStack)> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| ConvertirError::IoError {
        message: format!("Failed to read {}: {e}", path.as_ref().display()),
    })?;
    parse_text(&text)
}

fn parse_row(line_no: usize, line: &str) -> Result<WeightVector> {
    line.split(' ')
        .map(|token| {
            let value: f32 = token.parse().map_err(|_| ConvertirError::FormatError {
                reason: format!("line {line_no}: invalid weight token {token:?}"),
            })?;
            Ok(truncate_f32(value))
        })
        .collect()
}
