//! Data and wire types exchanged between the parties of a square-division
//! computation.
//!
//! Everything that crosses a party boundary derives [`Serialize`] /
//! [`Deserialize`] so transports can frame the messages however they like
//! (the in-process transport in [`crate::transport`] uses bincode).

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Correlates all protocol messages belonging to one `(attribute, value)`
/// evaluation across parties.
///
/// Ids are allocated by the initiator controller, unique and monotonically
/// increasing within one tree-induction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComputationId(pub u64);

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value of the class attribute, used as the key of per-class counts and
/// protocol state.
///
/// A typed key with explicit equality and ordering semantics; class values
/// coming from data rows and class values coming off the wire compare equal
/// exactly when their textual representations do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassValue(String);

impl ClassValue {
    /// The textual representation of this class value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassValue {
    fn from(value: &str) -> Self {
        ClassValue(value.to_string())
    }
}

impl From<String> for ClassValue {
    fn from(value: String) -> Self {
        ClassValue(value)
    }
}

impl fmt::Display for ClassValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(attribute, value)` constraint on the path from the tree root to the
/// current recursion point.
///
/// The order of pairs in a path matters: it defines the filter chain the
/// data layer applies before counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValuePair {
    /// Name of the attribute the tree branched on.
    pub attribute: String,
    /// The branch value taken.
    pub value: String,
}

impl NodeValuePair {
    /// Creates a new pair.
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        NodeValuePair {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// The per-class ciphertext travelling through the multiplication round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplicationResult {
    /// The class value this ciphertext belongs to.
    pub class_value: ClassValue,
    /// The intermediate ciphertext for this class value.
    pub ciphertext: BigUint,
}

/// The paired Z and W ciphertexts carried together through the addition
/// round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionResults {
    /// Intermediate ciphertext of the Z (sum of squares) computation.
    pub for_z: BigUint,
    /// Intermediate ciphertext of the W (sum of counts) computation.
    pub for_w: BigUint,
}

/// A terminal party's contribution to the final Z/W ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareDivisionResult {
    /// The party's addition output share for Z.
    pub output_share_z: BigUint,
    /// The party's addition output share for W.
    pub output_share_w: BigUint,
    /// The class value this party observed a nonzero count for, if any.
    pub class_value: Option<ClassValue>,
}

/// The wire envelope of the multiplication round, identifying the
/// computation and the `(attribute, value)` split under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareDivisionMsg {
    /// The computation this message belongs to.
    pub id: ComputationId,
    /// Name of the candidate splitting attribute.
    pub attr_name: String,
    /// The attribute value under evaluation.
    pub attr_value: String,
    /// Constraints accumulated on the path from the tree root.
    pub path: Vec<NodeValuePair>,
    /// One intermediate ciphertext per class value.
    pub results: Vec<MultiplicationResult>,
}

/// The outcome of one secure `(attribute, value)` evaluation, as delivered
/// to the tree builder.
#[derive(Debug, Clone, PartialEq)]
pub struct GiniGainResult {
    /// The class value resolved across parties, if any party observed a
    /// nonzero count.
    pub class_value: Option<ClassValue>,
    /// The Gini-impurity ratio `Z / W`, or `0` when `W == 0`.
    pub ratio: f64,
}
