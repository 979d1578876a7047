#![warn(missing_docs)]

//! Constraint-based structure learning for Bayesian networks over discrete
//! data.
//!
//! Given a table of categorical observations, this crate computes, for each
//! target variable, its Markov blanket (the minimal set of variables that
//! renders it conditionally independent of everything else) or its
//! parents-and-children set, and assembles the per-target neighborhoods into
//! an undirected (optionally collider-oriented) network skeleton.
//!
//! The algorithms are the classic constraint-based ones:
//!
//! - Margaritis & Thrun, *Bayesian Network Induction via Local
//!   Neighborhoods*, 1999 (grow-shrink);
//! - Tsamardinos et al., *Algorithms for Large Scale Markov Blanket
//!   Discovery*, 2003 (IAMB and Inter-IAMB);
//! - Tsamardinos et al., *Time and Sample Efficient Discovery of Markov
//!   Blankets and Direct Causal Relations*, 2003 (MMPC);
//! - Aliferis et al., *HITON: A Novel Markov Blanket Algorithm for Optimal
//!   Variable Selection*, 2003 (HITON and its semi-interleaved variant);
//! - Peña et al., *Towards Scalable and Data Efficient Learning of Markov
//!   Boundaries*, 2007 (GetPC).
//!
//! All of them consult the same conditional-independence oracle: the G²
//! likelihood-ratio statistic over contingency tables, referred to a
//! chi-squared distribution. The dominant cost is the combinatorial search
//! over conditioning subsets, which can be distributed across the ranks of a
//! [`comm::Communicator`] with the early-exit semantics preserved:
//! independence found anywhere stops everyone.

pub mod comm;
pub mod counter;
pub mod data;
pub mod discovery;
pub mod gsquare;
pub mod network;
pub mod reader;
pub mod set;

pub use comm::{Communicator, SoloComm, ThreadComm};
pub use counter::{Counter, CtCounter};
pub use data::DiscreteData;
pub use discovery::{Algorithm, Learner};
pub use network::Graph;
pub use set::VarSet;

use thiserror::Error as ThisError;

/// A variable identifier; every dataset indexes its variables densely from
/// zero.
pub type Var = u16;

/// Everything that can go wrong between the command line and a learned
/// network.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// The requested discovery algorithm does not exist.
    #[error("algorithm `{0}` not found; supported algorithms are {{gs, iamb, inter.iamb, mmpc, hiton, si.hiton.pc, getpc}}")]
    UnknownAlgorithm(String),

    /// The requested counter implementation does not exist.
    #[error("counter `{0}` not found; supported counters are {{ct}}")]
    UnknownCounter(String),

    /// The target variable name is not in the dataset.
    #[error("target variable `{0}` not found")]
    UnknownVariable(String),

    /// More variables than the identifier space supports.
    #[error("{0} variables exceed the supported maximum of 65535")]
    TooManyVariables(usize),

    /// The significance level must be a probability strictly inside (0, 1).
    #[error("alpha must lie strictly between 0 and 1, got {0}")]
    InvalidAlpha(f64),

    /// The field separator must be a single-byte character.
    #[error("separator `{0}` is not a single-byte character")]
    InvalidSeparator(char),

    /// A cell failed to parse as a category code.
    #[error("malformed cell `{value}` in record {record}")]
    MalformedCell {
        /// The offending field text.
        value: String,
        /// The zero-based record it appeared in.
        record: usize,
    },

    /// A cell parsed but does not fit in a byte.
    #[error("cell value {value} in record {record} exceeds the maximum category code 255")]
    CellOutOfRange {
        /// The parsed value.
        value: u32,
        /// The zero-based record it appeared in.
        record: usize,
    },

    /// The table dimensions do not match the declared `n`/`m`.
    #[error("expected {expected} {axis}, found {found}")]
    ShapeMismatch {
        /// Which dimension disagreed.
        axis: &'static str,
        /// The declared extent.
        expected: usize,
        /// The observed extent.
        found: usize,
    },

    /// Variable names must be unique for name/index round-tripping.
    #[error("duplicate variable name `{0}`")]
    DuplicateVariableName(String),

    /// An I/O failure reading the table or writing the graph.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
