//! End-to-end conversion tests
//!
//! Exercise the full pipeline through the public API: text dump on disk in,
//! wire-format container out, re-parsed with the crate's own decoder.
//! Covers both encoding profiles and the all-or-nothing output guarantee.

use std::fs;

use tempfile::tempdir;

use convertir::convert::TxtToProtoConverter;
use convertir::net::NetWeights;
use convertir::proto::{self, Precision};
use convertir::ConvertirError;

/// A dump with `num_residual` residual blocks; row `i` holds `i + 1` copies
/// of a value derived from `i`, so both position and length survive checks.
fn dump_text(version: u32, num_residual: usize) -> String {
    let mut text = format!("{version}\n");
    for i in 0..NetWeights::expected_vectors(num_residual) {
        let row: Vec<String> = (0..=i).map(|j| format!("{}.5", i + j)).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    text
}

#[test]
fn test_file_roundtrip_float_profile() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("weights.txt");
    let output = dir.path().join("weights.pb");
    fs::write(&input, dump_text(30, 2)).expect("write input");

    let stats = TxtToProtoConverter::convert_file(&input, &output, Precision::Float)
        .expect("convert");
    assert_eq!(stats.version, 30);
    assert_eq!(stats.num_residual, 2);

    let bytes = fs::read(&output).expect("read output");
    assert_eq!(bytes.len(), stats.output_bytes);

    let net = proto::decode(&bytes).expect("decode");
    assert_eq!(net.version, 30);
    assert_eq!(net.residual.len(), 2);
    // Row 0 is the input block's weights: one value, 0.5.
    assert_eq!(net.input.weights, vec![0.5]);
}

#[test]
fn test_file_roundtrip_bf16_profile() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("weights.txt");
    let output = dir.path().join("weights.pb");
    fs::write(&input, dump_text(30, 1)).expect("write input");

    TxtToProtoConverter::convert_file(&input, &output, Precision::Bf16).expect("convert");

    let net = proto::decode(&fs::read(&output).expect("read output")).expect("decode");
    assert_eq!(net.version, 30);
    assert_eq!(net.residual.len(), 1);

    // The bf16 container decodes to the same values as the float one.
    let float_bytes =
        TxtToProtoConverter::convert(&dump_text(30, 1), Precision::Float).expect("convert");
    assert_eq!(proto::decode(&float_bytes).expect("decode"), net);
}

#[test]
fn test_output_overwritten() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("weights.txt");
    let output = dir.path().join("weights.pb");
    fs::write(&input, dump_text(1, 0)).expect("write input");
    fs::write(&output, b"stale bytes from an earlier run").expect("write stale");

    let stats =
        TxtToProtoConverter::convert_file(&input, &output, Precision::Float).expect("convert");
    let bytes = fs::read(&output).expect("read output");
    assert_eq!(bytes.len(), stats.output_bytes);
    assert!(proto::decode(&bytes).is_ok());
}

#[test]
fn test_malformed_dump_writes_no_output() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("weights.txt");
    let output = dir.path().join("weights.pb");

    // One stray vector beyond a valid 0-residual dump.
    let mut text = dump_text(1, 0);
    text.push_str("9.0\n");
    fs::write(&input, text).expect("write input");

    let err = TxtToProtoConverter::convert_file(&input, &output, Precision::Float).unwrap_err();
    assert!(matches!(err, ConvertirError::StructuralError { .. }));
    assert!(!output.exists());
}

#[test]
fn test_bad_token_writes_no_output() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("weights.txt");
    let output = dir.path().join("weights.pb");
    fs::write(&input, "1\nnot a number\n").expect("write input");

    let err = TxtToProtoConverter::convert_file(&input, &output, Precision::Float).unwrap_err();
    assert!(matches!(err, ConvertirError::FormatError { .. }));
    assert!(!output.exists());
}

#[test]
fn test_truncation_applied_end_to_end() {
    let mut text = String::from("5\n");
    // 18 rows of a value with a busy low mantissa half.
    for _ in 0..18 {
        text.push_str("1.2345678\n");
    }
    let bytes = TxtToProtoConverter::convert(&text, Precision::Float).expect("convert");
    let net = proto::decode(&bytes).expect("decode");
    // 1.2345678 = 0x3F9E0651; truncated to 0x3F9E0000.
    assert_eq!(net.input.weights[0].to_bits(), 0x3F9E_0000);
    assert_eq!(net.ip2_val_b[0].to_bits(), 0x3F9E_0000);
}
