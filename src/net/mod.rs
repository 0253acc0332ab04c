//! Network data model and structure assembler
//!
//! The text dump stores one flat weight vector per line with no structural
//! markers; the network's shape has to be recovered from vector count and
//! position alone. The file order is the forward order of the network
//! (input block, residual tower, policy head, value head), so consuming the
//! rows back-to-front visits the value head first and the input block last.
//!
//! [`WeightStack`] models the parsed rows with tail-pop access only, and
//! [`NetWeights::from_stack`] performs the fixed pop sequence. Grouping a
//! convolution block is centralized in one helper so the four-vector order
//! (weights, biases, batch-norm means, batch-norm stddivs in the file) is
//! defined in exactly one place.

use crate::error::{ConvertirError, Result};

/// One flat weight vector: a single row of the text dump, already truncated
/// to bfloat16 precision.
pub type WeightVector = Vec<f32>;

/// Head-section vector count: two fully-connected layers of the value head
/// (4), the value convolution (4), the policy fully-connected layer (2) and
/// the policy convolution (4).
const HEAD_VECTORS: usize = 14;

/// Vectors per residual block (two convolution blocks).
const RESIDUAL_VECTORS: usize = 8;

/// Vectors in the input convolution block.
const INPUT_VECTORS: usize = 4;

/// Parsed weight rows, consumed destructively from the tail.
///
/// The assembler must consume every row exactly once; popping past the end
/// and leftover rows are both structural errors.
#[derive(Debug)]
pub struct WeightStack {
    rows: Vec<WeightVector>,
}

impl WeightStack {
    /// Wrap parsed rows in file order.
    #[must_use]
    pub fn new(rows: Vec<WeightVector>) -> Self {
        Self { rows }
    }

    /// Number of rows not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when every row has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pop the last remaining row; `what` names the destination field for
    /// the error message.
    pub(crate) fn pop(&mut self, what: &'static str) -> Result<WeightVector> {
        self.rows.pop().ok_or_else(|| ConvertirError::StructuralError {
            reason: format!("truncated input: no vector left for {what}"),
        })
    }
}

/// One convolution block: convolution weights and biases plus the
/// batch-norm means and stddiv-derived scales.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvBlock {
    /// Convolution kernel weights
    pub weights: WeightVector,
    /// Convolution biases
    pub biases: WeightVector,
    /// Batch-norm means
    pub bn_means: WeightVector,
    /// Batch-norm standard deviations (or the derived scale term)
    pub bn_stddivs: WeightVector,
}

impl ConvBlock {
    /// Pop one convolution block off the stack.
    ///
    /// Stack order is the reverse of file order, so the fields arrive as
    /// stddivs, means, biases, weights.
    fn from_stack(stack: &mut WeightStack) -> Result<Self> {
        let bn_stddivs = stack.pop("bn_stddivs")?;
        let bn_means = stack.pop("bn_means")?;
        let biases = stack.pop("biases")?;
        let weights = stack.pop("weights")?;
        Ok(Self {
            weights,
            biases,
            bn_means,
            bn_stddivs,
        })
    }

    fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len() + self.bn_means.len() + self.bn_stddivs.len()
    }
}

/// One residual block of the tower.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Residual {
    /// First convolution block
    pub conv1: ConvBlock,
    /// Second convolution block
    pub conv2: ConvBlock,
}

/// The fully assembled network, ready for encoding.
///
/// Built in one pass by [`NetWeights::from_stack`] and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetWeights {
    /// Format version from line 1 of the dump
    pub version: u32,
    /// Input convolution block
    pub input: ConvBlock,
    /// Residual tower, index 0 is the first-applied block
    pub residual: Vec<Residual>,
    /// Policy head convolution block
    pub policy: ConvBlock,
    /// Policy head fully-connected weights
    pub ip_pol_w: WeightVector,
    /// Policy head fully-connected biases
    pub ip_pol_b: WeightVector,
    /// Value head convolution block
    pub value: ConvBlock,
    /// Value head first fully-connected weights
    pub ip1_val_w: WeightVector,
    /// Value head first fully-connected biases
    pub ip1_val_b: WeightVector,
    /// Value head second fully-connected weights
    pub ip2_val_w: WeightVector,
    /// Value head second fully-connected biases
    pub ip2_val_b: WeightVector,
}

impl NetWeights {
    /// Assemble the network from parsed rows, consuming the stack.
    ///
    /// The pop sequence is fixed: value head fully-connected layers, value
    /// convolution, policy fully-connected layer, policy convolution, the
    /// residual tower back-to-front, and finally the input block. The tower
    /// size is inferred from the vectors left after the heads: it must be
    /// the input block plus a whole number of residual blocks.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` if the stack runs out mid-pop, if the
    /// post-head vector count does not decompose into input block plus
    /// whole residual blocks, or if any rows are left over after assembly.
    pub fn from_stack(version: u32, mut stack: WeightStack) -> Result<Self> {
        let ip2_val_b = stack.pop("ip2_val_b")?;
        let ip2_val_w = stack.pop("ip2_val_w")?;
        let ip1_val_b = stack.pop("ip1_val_b")?;
        let ip1_val_w = stack.pop("ip1_val_w")?;
        let value = ConvBlock::from_stack(&mut stack)?;
        let ip_pol_b = stack.pop("ip_pol_b")?;
        let ip_pol_w = stack.pop("ip_pol_w")?;
        let policy = ConvBlock::from_stack(&mut stack)?;

        let remaining = stack.len();
        if remaining < INPUT_VECTORS || (remaining - INPUT_VECTORS) % RESIDUAL_VECTORS != 0 {
            return Err(ConvertirError::StructuralError {
                reason: format!(
                    "malformed input: residual tower vector count not divisible by 8 \
                     ({remaining} vectors after heads)"
                ),
            });
        }
        let num_residual = (remaining - INPUT_VECTORS) / RESIDUAL_VECTORS;

        // The tower is stored back-to-front relative to the stack: the last
        // residual block's conv2 is the first group popped. Pop the blocks
        // last-first and flip once at the end to restore forward order.
        let mut residual = Vec::with_capacity(num_residual);
        for _ in 0..num_residual {
            let conv2 = ConvBlock::from_stack(&mut stack)?;
            let conv1 = ConvBlock::from_stack(&mut stack)?;
            residual.push(Residual { conv1, conv2 });
        }
        residual.reverse();

        let input = ConvBlock::from_stack(&mut stack)?;

        if !stack.is_empty() {
            return Err(ConvertirError::StructuralError {
                reason: format!("{} vectors left over after assembly", stack.len()),
            });
        }

        Ok(Self {
            version,
            input,
            residual,
            policy,
            ip_pol_w,
            ip_pol_b,
            value,
            ip1_val_w,
            ip1_val_b,
            ip2_val_w,
            ip2_val_b,
        })
    }

    /// Vector count of a valid dump with `num_residual` residual blocks.
    #[must_use]
    pub fn expected_vectors(num_residual: usize) -> usize {
        INPUT_VECTORS + num_residual * RESIDUAL_VECTORS + HEAD_VECTORS
    }

    /// Total number of scalar parameters across all fields.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        let tower: usize = self
            .residual
            .iter()
            .map(|r| r.conv1.num_parameters() + r.conv2.num_parameters())
            .sum();
        self.input.num_parameters()
            + tower
            + self.policy.num_parameters()
            + self.ip_pol_w.len()
            + self.ip_pol_b.len()
            + self.value.num_parameters()
            + self.ip1_val_w.len()
            + self.ip1_val_b.len()
            + self.ip2_val_w.len()
            + self.ip2_val_b.len()
    }
}
