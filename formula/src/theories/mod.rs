// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Per-theory backend capabilities and the managers built on top of them.
//!
//! A backend implements one trait per theory. Each trait has a single
//! primitive that applies one of the theory's built-in operators (see
//! [`FunctionKind`]); the managers in the submodules check sorts and implement
//! the shared policies (memoization, folding, fallbacks) over those
//! primitives. Optional theories default to [`FormulaError::Unsupported`].

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{FunctionKind, Quantifier},
    tactic::Tactic,
};

pub mod array;
pub mod bitvector;
pub mod boolean;
pub mod floating_point;
pub mod numeral;
pub mod quantifier;
pub mod uf;

pub use array::ArrayManager;
pub use bitvector::BitvectorManager;
pub use boolean::{BooleanFormulaVisitor, BooleanManager};
pub use floating_point::FloatingPointManager;
pub use numeral::{NonLinearArithmetic, NumeralManager};
pub use quantifier::QuantifierManager;
pub use uf::UfManager;

pub(crate) fn unsupported(what: impl std::fmt::Debug) -> FormulaError {
    FormulaError::Unsupported(format!("{what:?}"))
}

/// Propositional connectives, `ite`, `=` and `distinct`.
pub trait BooleanTheory: FormulaCreator {
    /// Apply a Boolean or core operator. Backends may reject
    /// [`FunctionKind::Implies`] with `Unsupported`, in which case the manager
    /// falls back to `(or (not a) b)`.
    fn make_boolean_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError>;
}

/// Integer and rational arithmetic.
pub trait NumeralTheory: FormulaCreator {
    /// Apply an arithmetic operator or comparison. Non-linear multiplication,
    /// division and modulo may be rejected with `Unsupported`.
    fn make_numeral_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError>;
}

/// Fixed-width bitvectors.
pub trait BitvectorTheory: FormulaCreator {
    /// Build a bitvector operation.
    fn make_bitvector_op(
        &self,
        kind: &FunctionKind,
        _args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        Err(unsupported(kind))
    }
}

/// IEEE floating point.
pub trait FloatingPointTheory: FormulaCreator {
    /// Build a floating-point operation.
    fn make_floating_point_op(
        &self,
        kind: &FunctionKind,
        _args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        Err(unsupported(kind))
    }
}

/// Quantifiers and quantifier elimination.
pub trait QuantifierTheory: FormulaCreator {
    /// Bind the given free variables in `body`.
    fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[Self::Term],
        body: &Self::Term,
    ) -> Result<Self::Term, FormulaError>;

    /// Eliminate quantifiers with a native procedure.
    fn eliminate_quantifiers(&self, _f: &Self::Term) -> Result<Self::Term, FormulaError> {
        Err(unsupported("quantifier elimination"))
    }
}

/// Arrays with extensionality.
pub trait ArrayTheory: FormulaCreator {
    /// Build an array operation.
    fn make_array_op(
        &self,
        kind: &FunctionKind,
        _args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        Err(unsupported(kind))
    }
}

/// Native formula rewriting.
pub trait TacticTheory: FormulaCreator {
    /// Apply a backend tactic. [`Tactic::Nnf`] never reaches the backend.
    fn apply_tactic(&self, tactic: Tactic, _f: &Self::Term) -> Result<Self::Term, FormulaError> {
        Err(unsupported(tactic))
    }

    /// Simplify a formula into an equivalent one. The default is the identity.
    fn simplify(&self, f: &Self::Term) -> Result<Self::Term, FormulaError> {
        Ok(f.clone())
    }
}
