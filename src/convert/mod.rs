//! Text dump to binary container conversion
//!
//! Ties the pipeline together: parse the text dump, assemble the network
//! structure, encode the wire-format container, write the bytes. The write
//! happens only after every prior stage has fully succeeded, so a failed
//! run never leaves a partial output file behind.
//!
//! ## Example
//!
//! ```rust,ignore
//! use convertir::convert::TxtToProtoConverter;
//! use convertir::proto::Precision;
//!
//! let stats = TxtToProtoConverter::convert_file(
//!     "weights.txt".as_ref(),
//!     "weights.pb".as_ref(),
//!     Precision::Bf16,
//! )?;
//! println!("residual blocks: {}", stats.num_residual);
//! ```

use std::fs;
use std::path::Path;

use crate::error::{ConvertirError, Result};
use crate::net::NetWeights;
use crate::parse;
use crate::proto::{self, Precision};

/// Text dump to wire-format converter
pub struct TxtToProtoConverter;

impl TxtToProtoConverter {
    /// Convert dump text to container bytes in the requested profile.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` for unparseable text and `StructuralError`
    /// when the vector count does not form a valid network.
    pub fn convert(text: &str, precision: Precision) -> Result<Vec<u8>> {
        let (version, stack) = parse::parse_text(text)?;
        let net = NetWeights::from_stack(version, stack)?;
        Ok(proto::encode(&net, precision))
    }

    /// Convert a dump file and write the container to `output`.
    ///
    /// The input is read fully into memory, converted, and only then
    /// written in a single `fs::write` that overwrites any existing file.
    ///
    /// # Errors
    ///
    /// Any [`Self::convert`] error, or `IoError` if the input cannot be
    /// read or the output cannot be written.
    pub fn convert_file(input: &Path, output: &Path, precision: Precision) -> Result<ConversionStats> {
        let text = fs::read_to_string(input).map_err(|e| ConvertirError::IoError {
            message: format!("Failed to read {}: {e}", input.display()),
        })?;

        let (version, stack) = parse::parse_text(&text)?;
        let net = NetWeights::from_stack(version, stack)?;
        let bytes = proto::encode(&net, precision);

        let stats = ConversionStats {
            version: net.version,
            num_residual: net.residual.len(),
            total_parameters: net.num_parameters(),
            output_bytes: bytes.len(),
        };

        fs::write(output, &bytes).map_err(|e| ConvertirError::IoError {
            message: format!("Failed to write {}: {e}", output.display()),
        })?;

        Ok(stats)
    }
}

/// Summary of a successful conversion, reported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionStats {
    /// Format version from the dump
    pub version: u32,
    /// Residual blocks in the tower
    pub num_residual: usize,
    /// Total scalar parameters across all fields
    pub total_parameters: usize,
    /// Size of the written container
    pub output_bytes: usize,
}
