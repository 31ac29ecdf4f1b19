// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The prover contract: incremental solving sessions created from a context.
//!
//! A [`SolverContext`] builds formulas (through the theory traits of the
//! `formula` crate) and creates provers. A prover is an assertion stack over
//! formulas of that context. The portfolio is written purely against these
//! traits.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use formula::{model::Model, Formula, FormulaError, SolverTheories, Value};

use crate::basics::BasicCanceler;

/// Which optional results a prover has to be able to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProverOptions {
    /// Allow [`ProverEnvironment::model`] and [`ProverEnvironment::evaluate`]
    pub generate_models: bool,
    /// Allow [`ProverEnvironment::unsat_core`]
    pub generate_unsat_cores: bool,
    /// Allow the [`InterpolatingProver`] operations
    pub generate_interpolants: bool,
}

/// An incremental solving session.
pub trait ProverEnvironment: Send {
    /// The term type of the context the prover was created from
    type Term: Clone + Eq + Hash + Debug + Send + Sync;
    /// Identifies an asserted constraint, for interpolation
    type Id: Clone + Debug + Send + Sync;
    /// Cancels the prover's in-flight call
    type Canceler: BasicCanceler + Clone + 'static;

    /// Open a new assertion level.
    fn push(&mut self) -> Result<(), FormulaError>;

    /// Drop the most recent assertion level and everything asserted in it.
    fn pop(&mut self) -> Result<(), FormulaError>;

    /// The number of open levels.
    fn stack_depth(&self) -> usize;

    /// Assert a Boolean formula on the current level.
    fn add_constraint(&mut self, f: &Formula<Self::Term>) -> Result<Self::Id, FormulaError>;

    /// Whether the current assertions are unsatisfiable.
    fn is_unsat(&mut self) -> Result<bool, FormulaError>;

    /// Whether the current assertions together with the given literals are
    /// unsatisfiable. The literals are not asserted.
    fn is_unsat_with_assumptions(
        &mut self,
        assumptions: &[Formula<Self::Term>],
    ) -> Result<bool, FormulaError>;

    /// A model of the assertions, after a satisfiable check.
    fn model(&mut self) -> Result<Model<Self::Term>, FormulaError>;

    /// The value of a formula in the current model, if it has a constant
    /// value.
    fn evaluate(&mut self, f: &Formula<Self::Term>) -> Result<Option<Value>, FormulaError>;

    /// A subset of the asserted constraints that is unsatisfiable, after an
    /// unsatisfiable check.
    fn unsat_core(&mut self) -> Result<Vec<Formula<Self::Term>>, FormulaError>;

    /// A handle that cancels the prover's in-flight call from another thread.
    fn canceler(&self) -> Self::Canceler;
}

/// A prover that computes Craig interpolants over its asserted constraints.
pub trait InterpolatingProver: ProverEnvironment {
    /// An interpolant of `A` (the given constraints) and `B` (all other
    /// current constraints), after an unsatisfiable check. An empty `A` gives
    /// `true` and an `A` containing every constraint gives `false`.
    fn interpolant(
        &mut self,
        partition_a: &[Self::Id],
    ) -> Result<Formula<Self::Term>, FormulaError>;

    /// Sequence interpolants for `n` partitions, yielding `n - 1` formulas.
    fn sequence_interpolants(
        &mut self,
        partitions: &[Vec<Self::Id>],
    ) -> Result<Vec<Formula<Self::Term>>, FormulaError>;

    /// Tree interpolants for partitions in post-order, where
    /// `start_of_subtree[i]` is the index of the leftmost leaf under node `i`.
    fn tree_interpolants(
        &mut self,
        _partitions: &[Vec<Self::Id>],
        _start_of_subtree: &[usize],
    ) -> Result<Vec<Formula<Self::Term>>, FormulaError> {
        Err(FormulaError::Unsupported("tree interpolants".to_string()))
    }
}

/// A context that creates provers over its formulas.
pub trait SolverContext: SolverTheories + Sized {
    /// The prover this context creates.
    type Prover: InterpolatingProver<Term = Self::Term>;

    /// Create a fresh prover with an empty assertion stack.
    fn new_prover(self: &Arc<Self>, options: ProverOptions) -> Result<Self::Prover, FormulaError>;
}
