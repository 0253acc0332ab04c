//! Binary container codec
//!
//! Hand-rolled protobuf wire-format codec for the agreed network schema.
//! The schema is a fixed contract with the consuming inference engine; the
//! field numbers are pinned here and never negotiated.
//!
//! # Schema (wire layout)
//!
//! ```text
//! Weights {
//!   version: uint32          (field 1, varint)
//!   input: ConvBlock         (field 2, message)
//!   residual: [Residual]     (field 3, repeated message)
//!   policy: ConvBlock        (field 4, message)
//!   ip_pol_w: layer          (field 5)
//!   ip_pol_b: layer          (field 6)
//!   value: ConvBlock         (field 7, message)
//!   ip1_val_w: layer         (field 8)
//!   ip1_val_b: layer         (field 9)
//!   ip2_val_w: layer         (field 10)
//!   ip2_val_b: layer         (field 11)
//! }
//! ConvBlock { weights = 1, biases = 2, bn_means = 3, bn_stddivs = 4 (layers) }
//! Residual  { conv1 = 1, conv2 = 2 }
//! ```
//!
//! A `layer` has two encodings, one per target profile:
//!
//! - [`Precision::Float`]: repeated unpacked fixed32, one tagged f32 per
//!   element;
//! - [`Precision::Bf16`]: a single length-delimited buffer of little-endian
//!   16-bit truncated codes.
//!
//! The decoder accepts either encoding on any layer field, keyed off the
//! wire type. It exists for the loading path and for round-trip tests;
//! encode followed by decode reproduces every field bit-for-bit because the
//! parser already truncated all values to bfloat16 precision.

use half::bf16;

use crate::error::{ConvertirError, Result};
use crate::net::{ConvBlock, NetWeights, Residual, WeightVector};

const WIRE_VARINT: u32 = 0;
const WIRE_LEN: u32 = 2;
const WIRE_FIXED32: u32 = 5;

/// Weight encoding profile of the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Precision {
    /// Repeated individual f32 values (bfloat16-truncated mantissas)
    Float,
    /// Packed buffer of 16-bit truncated codes
    Bf16,
}

// =============================================================================
// Wire writer
// =============================================================================

struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn tag(&mut self, field: u32, wire_type: u32) {
        self.varint(u64::from(field << 3 | wire_type));
    }

    fn uint_field(&mut self, field: u32, v: u64) {
        self.tag(field, WIRE_VARINT);
        self.varint(v);
    }

    fn float_field(&mut self, field: u32, v: f32) {
        self.tag(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes_field(&mut self, field: u32, data: &[u8]) {
        self.tag(field, WIRE_LEN);
        self.varint(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    fn layer_field(&mut self, field: u32, values: &[f32], precision: Precision) {
        match precision {
            Precision::Float => {
                for &v in values {
                    self.float_field(field, v);
                }
            }
            Precision::Bf16 => {
                let mut codes = Vec::with_capacity(values.len() * 2);
                for &v in values {
                    let code = bf16::from_bits((v.to_bits() >> 16) as u16);
                    codes.extend_from_slice(&code.to_bits().to_le_bytes());
                }
                self.bytes_field(field, &codes);
            }
        }
    }
}

fn encode_conv_block(block: &ConvBlock, precision: Precision) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.layer_field(1, &block.weights, precision);
    w.layer_field(2, &block.biases, precision);
    w.layer_field(3, &block.bn_means, precision);
    w.layer_field(4, &block.bn_stddivs, precision);
    w.into_bytes()
}

/// Encode a fully assembled network in the requested profile.
#[must_use]
pub fn encode(net: &NetWeights, precision: Precision) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.uint_field(1, u64::from(net.version));
    w.bytes_field(2, &encode_conv_block(&net.input, precision));
    for res in &net.residual {
        let mut rw = WireWriter::new();
        rw.bytes_field(1, &encode_conv_block(&res.conv1, precision));
        rw.bytes_field(2, &encode_conv_block(&res.conv2, precision));
        w.bytes_field(3, &rw.into_bytes());
    }
    w.bytes_field(4, &encode_conv_block(&net.policy, precision));
    w.layer_field(5, &net.ip_pol_w, precision);
    w.layer_field(6, &net.ip_pol_b, precision);
    w.bytes_field(7, &encode_conv_block(&net.value, precision));
    w.layer_field(8, &net.ip1_val_w, precision);
    w.layer_field(9, &net.ip1_val_b, precision);
    w.layer_field(10, &net.ip2_val_w, precision);
    w.layer_field(11, &net.ip2_val_b, precision);
    w.into_bytes()
}

// =============================================================================
// Wire reader
// =============================================================================

struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| format_error("varint: unexpected end"))?;
            self.pos += 1;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(format_error("varint too long"));
            }
        }
    }

    fn read_tag(&mut self) -> Result<(u32, u32)> {
        let v = self.read_varint()?;
        Ok(((v >> 3) as u32, (v & 7) as u32))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| format_error("bytes: length past end of buffer"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_fixed32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.data.len() {
            return Err(format_error("fixed32: unexpected end"));
        }
        let v = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos = end;
        Ok(v)
    }
}

fn format_error(reason: &str) -> ConvertirError {
    ConvertirError::FormatError {
        reason: reason.to_string(),
    }
}

/// Append one layer value (or the whole packed buffer) to `out`.
fn read_layer(r: &mut WireReader<'_>, wire_type: u32, out: &mut WeightVector) -> Result<()> {
    match wire_type {
        WIRE_FIXED32 => out.push(f32::from_bits(r.read_fixed32()?)),
        WIRE_LEN => {
            let bytes = r.read_bytes()?;
            if bytes.len() % 2 != 0 {
                return Err(format_error("packed layer: odd byte count"));
            }
            for pair in bytes.chunks_exact(2) {
                let code = bf16::from_bits(u16::from_le_bytes([pair[0], pair[1]]));
                // Widening bf16 -> f32 is exact.
                out.push(code.to_f32());
            }
        }
        other => {
            return Err(format_error(&format!(
                "layer field: unexpected wire type {other}"
            )))
        }
    }
    Ok(())
}

fn decode_conv_block(data: &[u8]) -> Result<ConvBlock> {
    let mut r = WireReader::new(data);
    let mut block = ConvBlock::default();
    while !r.is_empty() {
        let (field, wire_type) = r.read_tag()?;
        let target = match field {
            1 => &mut block.weights,
            2 => &mut block.biases,
            3 => &mut block.bn_means,
            4 => &mut block.bn_stddivs,
            other => {
                return Err(format_error(&format!(
                    "conv block: unknown field {other}"
                )))
            }
        };
        read_layer(&mut r, wire_type, target)?;
    }
    Ok(block)
}

fn decode_residual(data: &[u8]) -> Result<Residual> {
    let mut r = WireReader::new(data);
    let mut res = Residual::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WIRE_LEN) => res.conv1 = decode_conv_block(r.read_bytes()?)?,
            (2, WIRE_LEN) => res.conv2 = decode_conv_block(r.read_bytes()?)?,
            (field, wire_type) => {
                return Err(format_error(&format!(
                    "residual: unexpected field {field} (wire type {wire_type})"
                )))
            }
        }
    }
    Ok(res)
}

/// Decode a container produced by [`encode`], in either profile.
///
/// # Errors
///
/// Returns `FormatError` on truncated buffers, unknown fields or wire types
/// that do not match the schema.
pub fn decode(data: &[u8]) -> Result<NetWeights> {
    let mut r = WireReader::new(data);
    let mut net = NetWeights::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WIRE_VARINT) => net.version = r.read_varint()? as u32,
            (2, WIRE_LEN) => net.input = decode_conv_block(r.read_bytes()?)?,
            (3, WIRE_LEN) => net.residual.push(decode_residual(r.read_bytes()?)?),
            (4, WIRE_LEN) => net.policy = decode_conv_block(r.read_bytes()?)?,
            (5, wire_type) => read_layer(&mut r, wire_type, &mut net.ip_pol_w)?,
            (6, wire_type) => read_layer(&mut r, wire_type, &mut net.ip_pol_b)?,
            (7, WIRE_LEN) => net.value = decode_conv_block(r.read_bytes()?)?,
            (8, wire_type) => read_layer(&mut r, wire_type, &mut net.ip1_val_w)?,
            (9, wire_type) => read_layer(&mut r, wire_type, &mut net.ip1_val_b)?,
            (10, wire_type) => read_layer(&mut r, wire_type, &mut net.ip2_val_w)?,
            (11, wire_type) => read_layer(&mut r, wire_type, &mut net.ip2_val_b)?,
            (field, wire_type) => {
                return Err(format_error(&format!(
                    "weights: unexpected field {field} (wire type {wire_type})"
                )))
            }
        }
    }
    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::WeightStack;
    use crate::parse::truncate_f32;

    fn sample_net(num_residual: usize) -> NetWeights {
        let count = NetWeights::expected_vectors(num_residual);
        let rows = (0..count)
            .map(|i| {
                (0..=i % 3)
                    .map(|j| truncate_f32(0.125 * i as f32 + 0.3 * j as f32))
                    .collect()
            })
            .collect();
        NetWeights::from_stack(30, WeightStack::new(rows)).expect("assemble")
    }

    // =========================================================================
    // Writer Primitive Tests
    // =========================================================================

    #[test]
    fn test_varint_encoding() {
        let mut w = WireWriter::new();
        w.varint(0);
        w.varint(1);
        w.varint(127);
        w.varint(128);
        w.varint(300);
        assert_eq!(w.into_bytes(), vec![0, 1, 0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u64::from(u32::MAX), u64::MAX] {
            let mut w = WireWriter::new();
            w.varint(v);
            let bytes = w.into_bytes();
            let mut r = WireReader::new(&bytes);
            assert_eq!(r.read_varint().expect("varint"), v);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_float_field_layout() {
        let mut w = WireWriter::new();
        w.float_field(1, 1.0);
        // tag 0x0D = field 1, wire type 5; then 1.0f32 little-endian.
        assert_eq!(w.into_bytes(), vec![0x0D, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn test_version_field_layout() {
        let net = NetWeights {
            version: 30,
            ..NetWeights::default()
        };
        let bytes = encode(&net, Precision::Float);
        // tag 0x08 = field 1, wire type 0; varint 30.
        assert_eq!(&bytes[0..2], &[0x08, 30]);
    }

    // =========================================================================
    // Round-trip Tests
    // =========================================================================

    #[test]
    fn test_roundtrip_float_profile() {
        let net = sample_net(2);
        let decoded = decode(&encode(&net, Precision::Float)).expect("decode");
        assert_eq!(decoded, net);
    }

    #[test]
    fn test_roundtrip_bf16_profile() {
        let net = sample_net(2);
        let decoded = decode(&encode(&net, Precision::Bf16)).expect("decode");
        // Exact equality holds because all values were truncated at parse.
        assert_eq!(decoded, net);
    }

    #[test]
    fn test_roundtrip_empty_tower() {
        let net = sample_net(0);
        for precision in [Precision::Float, Precision::Bf16] {
            let decoded = decode(&encode(&net, precision)).expect("decode");
            assert_eq!(decoded, net);
            assert!(decoded.residual.is_empty());
        }
    }

    #[test]
    fn test_profiles_decode_to_same_values() {
        let net = sample_net(1);
        let from_float = decode(&encode(&net, Precision::Float)).expect("float");
        let from_bf16 = decode(&encode(&net, Precision::Bf16)).expect("bf16");
        assert_eq!(from_float, from_bf16);
    }

    #[test]
    fn test_version_survives_roundtrip() {
        let net = sample_net(0);
        assert_eq!(decode(&encode(&net, Precision::Float)).expect("decode").version, 30);
    }

    #[test]
    fn test_bf16_profile_is_smaller() {
        let net = sample_net(3);
        let float_bytes = encode(&net, Precision::Float);
        let bf16_bytes = encode(&net, Precision::Bf16);
        assert!(bf16_bytes.len() < float_bytes.len());
    }

    // =========================================================================
    // Decoder Error Tests
    // =========================================================================

    #[test]
    fn test_decode_truncated_buffer() {
        let bytes = encode(&sample_net(1), Precision::Bf16);
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ConvertirError::FormatError { .. }));
    }

    #[test]
    fn test_decode_unknown_field() {
        let mut w = WireWriter::new();
        w.uint_field(12, 5);
        let err = decode(&w.into_bytes()).unwrap_err();
        assert!(err.to_string().contains("unexpected field 12"));
    }

    #[test]
    fn test_decode_odd_packed_buffer() {
        let mut w = WireWriter::new();
        w.bytes_field(5, &[0x00, 0x3F, 0x80]);
        let err = decode(&w.into_bytes()).unwrap_err();
        assert!(err.to_string().contains("odd byte count"));
    }
}
