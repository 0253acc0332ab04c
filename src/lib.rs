//! # Convertir
//!
//! Converts a plain-text serialization of a convolutional network's trained
//! parameters into the compact binary container consumed by the inference
//! engine.
//!
//! The text dump is line-oriented: line 1 carries a version integer, every
//! following line is one flat weight vector. Nothing in the file marks
//! structure; the network's shape (input block, residual tower, policy and
//! value heads) is recovered by consuming the vectors from the end of the
//! file backward in a fixed pop order, with the tower size inferred from
//! the vector count. Every value is truncated to bfloat16 precision on the
//! way in.
//!
//! ## Example
//!
//! ```rust
//! use convertir::convert::TxtToProtoConverter;
//! use convertir::proto::{self, Precision};
//!
//! // Version line plus 18 single-value rows: a valid net with no tower.
//! let mut text = String::from("30\n");
//! for i in 0..18 {
//!     text.push_str(&format!("{i}.0\n"));
//! }
//!
//! let bytes = TxtToProtoConverter::convert(&text, Precision::Bf16).unwrap();
//! let net = proto::decode(&bytes).unwrap();
//! assert_eq!(net.version, 30);
//! assert!(net.residual.is_empty());
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // f32 bit pattern -> u16 code is the point
#![allow(clippy::cast_precision_loss)] // usize -> f32 only in tests
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::float_cmp)] // bit-exact float comparisons are intended

pub mod convert;
pub mod error;
pub mod net;
pub mod parse;
pub mod proto;

pub use error::{ConvertirError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
